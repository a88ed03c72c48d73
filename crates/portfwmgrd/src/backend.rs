//! Port-forward backend abstraction
//!
//! Two mutually exclusive enforcement mechanisms implement one trait. The
//! manager guarantees at most one backend's state exists on the host by
//! clearing the non-selected backend before every apply.

use std::str::FromStr;

use async_trait::async_trait;
use gremesh_common::{MeshError, MeshResult};

use crate::rules::ForwardRule;

/// The persisted backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Kernel NAT rules via dedicated iptables chains.
    NatRules,
    /// User-space proxy daemon (rinetd).
    ProxyDaemon,
}

impl BackendKind {
    /// The token stored in the selector file.
    pub fn as_token(&self) -> &'static str {
        match self {
            BackendKind::NatRules => "iptables",
            BackendKind::ProxyDaemon => "rinetd",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for BackendKind {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iptables" => Ok(BackendKind::NatRules),
            "rinetd" => Ok(BackendKind::ProxyDaemon),
            other => Err(MeshError::invalid_config(
                "backend",
                format!("unknown backend token '{}'", other),
            )),
        }
    }
}

/// Counts reported by a backend apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuleStats {
    /// Rules fully programmed.
    pub applied: u32,
    /// Rules skipped because programming failed.
    pub failed: u32,
}

/// One enforcement mechanism for the rule list.
///
/// `clear` must be idempotent and tolerant of absent state; it is invoked
/// on the non-selected backend before every apply, which is what makes
/// backend switchover leave no artifacts behind.
#[async_trait]
pub trait ForwardBackend: Send {
    /// Which selector this backend corresponds to.
    fn kind(&self) -> BackendKind;

    /// Returns true if the backend's tooling exists on this host.
    async fn available(&mut self) -> MeshResult<bool>;

    /// Removes every trace of this backend's enforcement state.
    async fn clear(&mut self) -> MeshResult<()>;

    /// Rebuilds this backend's enforcement state from the rule list.
    async fn apply(&mut self, rules: &[ForwardRule]) -> MeshResult<RuleStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_tokens() {
        assert_eq!(BackendKind::NatRules.as_token(), "iptables");
        assert_eq!(BackendKind::ProxyDaemon.as_token(), "rinetd");
        assert_eq!("iptables".parse::<BackendKind>().unwrap(), BackendKind::NatRules);
        assert_eq!("rinetd".parse::<BackendKind>().unwrap(), BackendKind::ProxyDaemon);
    }

    #[test]
    fn test_unknown_token_rejected() {
        let err = "socat".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, MeshError::InvalidConfig { .. }));
        assert!(err.to_string().contains("socat"));
    }
}
