//! Shell command execution utilities for the gremesh daemons.
//!
//! All kernel state changes go through external tools (`ip`, `iptables`,
//! `systemctl`). This module provides safe command execution with proper
//! quoting to prevent command injection from topology or rule files.
//!
//! # Example
//!
//! ```ignore
//! use gremesh_common::shell::{self, IP_CMD, shellquote};
//!
//! let cmd = format!("{} link set dev {} up", IP_CMD, shellquote("gre1"));
//! let result = shell::exec(&cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MeshError, MeshResult};

/// Path to the `ip` command for tunnel/address/route configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to the `iptables` command for NAT/forwarding rules.
pub const IPTABLES_CMD: &str = "/sbin/iptables";

/// Path to `systemctl` for controlling the proxy daemon.
pub const SYSTEMCTL_CMD: &str = "/usr/bin/systemctl";

/// Path to `sysctl` for kernel forwarding knobs.
pub const SYSCTL_CMD: &str = "/sbin/sysctl";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes the characters that keep
/// meaning inside them: `$`, `` ` ``, `"`, `\` and newline.
///
/// # Example
///
/// ```
/// use gremesh_common::shell::shellquote;
///
/// assert_eq!(shellquote("gre1"), "\"gre1\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The trimmed stdout output.
    pub stdout: String,
    /// The trimmed stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes a shell command asynchronously.
///
/// Runs the command through `/bin/sh -c` so callers can use pipes and
/// command chaining where needed.
///
/// Returns `Err` only when the command could not be spawned; a non-zero
/// exit is reported in the [`ExecResult`].
pub async fn exec(cmd: &str) -> MeshResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| MeshError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    let result = ExecResult {
        exit_code,
        stdout,
        stderr,
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
    } else {
        tracing::warn!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and returns an error on non-zero exit.
pub async fn exec_or_throw(cmd: &str) -> MeshResult<String> {
    let result = exec(cmd).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(MeshError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}
