//! Error types for the gremesh daemons.
//!
//! One taxonomy covers both the tunnel reconciler and the port-forward
//! manager. All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

/// Result type alias for gremesh operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors that can occur while reconciling host state.
#[derive(Debug, Error)]
pub enum MeshError {
    /// The topology description could not be read or parsed.
    #[error("Malformed topology: {message}")]
    MalformedTopology {
        /// What was wrong with the description.
        message: String,
    },

    /// A link references a node name with no known public address.
    #[error("Link {link_id} ({iran},{external}): no address for node '{name}'")]
    UnresolvedEndpoint {
        /// Positional id of the link in the topology.
        link_id: u32,
        /// Iran-side node name of the link.
        iran: String,
        /// External-side node name of the link.
        external: String,
        /// The name that failed to resolve.
        name: String,
    },

    /// A kernel programming command (interface, address, route, NAT rule)
    /// failed for one entry.
    #[error("Kernel programming failed for {what}: {detail}")]
    KernelProgramming {
        /// The entity being programmed (interface name, rule, ...).
        what: String,
        /// Failure detail, usually the failed command's output.
        detail: String,
    },

    /// Failed to spawn a shell command.
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// The selected port-forward backend's tooling is absent on this host.
    #[error("Backend '{backend}' unavailable: {message}")]
    BackendUnavailable {
        /// The backend that cannot run.
        backend: String,
        /// What is missing.
        message: String,
    },

    /// An operation was requested before its prerequisite state exists.
    #[error("Not configured: {what}")]
    NotConfigured {
        /// The missing prerequisite.
        what: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Failed to write a generated configuration file.
    #[error("Failed to write {path}: {source}")]
    ConfigWrite {
        /// The file being written.
        path: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl MeshError {
    /// Creates a malformed topology error.
    pub fn malformed_topology(message: impl Into<String>) -> Self {
        Self::MalformedTopology {
            message: message.into(),
        }
    }

    /// Creates an unresolved endpoint error for one link.
    pub fn unresolved_endpoint(
        link_id: u32,
        iran: impl Into<String>,
        external: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::UnresolvedEndpoint {
            link_id,
            iran: iran.into(),
            external: external.into(),
            name: name.into(),
        }
    }

    /// Creates a kernel programming error.
    pub fn kernel_programming(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::KernelProgramming {
            what: what.into(),
            detail: detail.into(),
        }
    }

    /// Creates a backend unavailable error.
    pub fn backend_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates a not-configured error.
    pub fn not_configured(what: impl Into<String>) -> Self {
        Self::NotConfigured { what: what.into() }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error must abort the whole reconcile.
    ///
    /// Per-entry errors (unresolved endpoints, failed kernel commands) are
    /// isolated to the entry and aggregated; structural errors are fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MeshError::MalformedTopology { .. } | MeshError::InvalidConfig { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MeshError::unresolved_endpoint(3, "teh1", "fra1", "fra1");
        assert_eq!(
            err.to_string(),
            "Link 3 (teh1,fra1): no address for node 'fra1'"
        );
    }

    #[test]
    fn test_shell_command_failed() {
        let err = MeshError::ShellCommandFailed {
            command: "ip tunnel add gre1 mode gre".to_string(),
            exit_code: 2,
            output: "File exists".to_string(),
        };
        assert!(err.to_string().contains("ip tunnel add gre1"));
        assert!(err.to_string().contains("exit code 2"));
    }

    #[test]
    fn test_not_configured() {
        let err = MeshError::not_configured("port-forward backend");
        assert_eq!(err.to_string(), "Not configured: port-forward backend");
    }

    #[test]
    fn test_is_fatal() {
        assert!(MeshError::malformed_topology("truncated").is_fatal());
        assert!(MeshError::invalid_config("backend", "bogus token").is_fatal());
        assert!(!MeshError::unresolved_endpoint(1, "a", "b", "b").is_fatal());
        assert!(!MeshError::kernel_programming("gre1", "File exists").is_fatal());
        assert!(!MeshError::not_configured("backend").is_fatal());
    }
}
