//! User-space proxy daemon backend (rinetd)
//!
//! Regenerates the daemon's configuration file in full from the rule list
//! (one `listen_ip listen_port dest_ip dest_port` line per rule) and
//! restarts the daemon. Clearing writes a forward-free configuration and
//! stops the daemon.

use std::path::PathBuf;

use async_trait::async_trait;
use gremesh_common::{shell, MeshError, MeshResult};
use tracing::{info, warn};

use crate::backend::{BackendKind, ForwardBackend, RuleStats};
use crate::rules::ForwardRule;

/// Default location of the rinetd configuration.
pub const DEFAULT_RINETD_CONF: &str = "/etc/rinetd.conf";

/// The systemd unit controlling the proxy daemon.
pub const RINETD_SERVICE: &str = "rinetd";

/// Build the daemon restart command
pub fn build_restart_cmd() -> String {
    format!("{} restart {}", shell::SYSTEMCTL_CMD, RINETD_SERVICE)
}

/// Build the daemon stop command
pub fn build_stop_cmd() -> String {
    format!("{} stop {}", shell::SYSTEMCTL_CMD, RINETD_SERVICE)
}

/// Build the tooling availability probe
pub fn build_probe_cmd() -> String {
    format!("command -v {}", RINETD_SERVICE)
}

/// Renders the full configuration file for a rule list.
pub fn render_config(rules: &[ForwardRule]) -> String {
    let mut out = String::from("# Generated by portfwmgrd; do not edit\n");
    for rule in rules {
        out.push_str(&rule.to_string());
        out.push('\n');
    }
    out
}

/// Proxy daemon backend state.
pub struct ProxyDaemonBackend {
    config_path: PathBuf,

    #[cfg(test)]
    mock_mode: bool,

    #[cfg(test)]
    captured_commands: Vec<String>,

    #[cfg(test)]
    fail_commands: Vec<String>,
}

impl ProxyDaemonBackend {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            #[cfg(test)]
            mock_mode: false,
            #[cfg(test)]
            captured_commands: Vec::new(),
            #[cfg(test)]
            fail_commands: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn new_mock(config_path: PathBuf) -> Self {
        let mut backend = Self::new(config_path);
        backend.mock_mode = true;
        backend
    }

    #[cfg(test)]
    pub fn with_failing_command(mut self, fragment: &str) -> Self {
        self.fail_commands.push(fragment.to_string());
        self
    }

    #[cfg(test)]
    pub fn captured_commands(&self) -> &[String] {
        &self.captured_commands
    }

    /// Execute shell command (or capture in mock mode)
    async fn exec(&mut self, cmd: &str) -> MeshResult<String> {
        #[cfg(test)]
        if self.mock_mode {
            self.captured_commands.push(cmd.to_string());
            if self.fail_commands.iter().any(|f| cmd.contains(f.as_str())) {
                return Err(MeshError::ShellCommandFailed {
                    command: cmd.to_string(),
                    exit_code: 2,
                    output: "mock failure".to_string(),
                });
            }
            return Ok(String::new());
        }

        shell::exec_or_throw(cmd).await
    }

    fn write_config(&self, rules: &[ForwardRule]) -> MeshResult<()> {
        std::fs::write(&self.config_path, render_config(rules)).map_err(|e| {
            MeshError::ConfigWrite {
                path: self.config_path.display().to_string(),
                source: e,
            }
        })
    }
}

#[async_trait]
impl ForwardBackend for ProxyDaemonBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ProxyDaemon
    }

    async fn available(&mut self) -> MeshResult<bool> {
        Ok(self.exec(&build_probe_cmd()).await.is_ok())
    }

    async fn clear(&mut self) -> MeshResult<()> {
        // Only rewrite a config that exists; clearing a host that never
        // ran the proxy must not create files
        if self.config_path.exists() {
            if let Err(e) = self.write_config(&[]) {
                warn!("Failed to empty proxy configuration: {}", e);
            }
        }
        if let Err(e) = self.exec(&build_stop_cmd()).await {
            warn!("Failed to stop proxy daemon: {}", e);
        }
        info!("Proxy daemon state cleared");
        Ok(())
    }

    async fn apply(&mut self, rules: &[ForwardRule]) -> MeshResult<RuleStats> {
        self.write_config(rules)?;
        self.exec(&build_restart_cmd()).await?;
        info!(
            rules = rules.len(),
            config = %self.config_path.display(),
            "Proxy configuration regenerated and daemon restarted"
        );
        Ok(RuleStats {
            applied: rules.len() as u32,
            failed: 0,
        })
    }
}
