//! Kernel NAT rule backend
//!
//! Programs three dedicated iptables chains so that re-applying flushes
//! and rebuilds only gremesh-owned rules, never touching unrelated system
//! rules. Jump wiring into the global entry points is check-then-add so
//! repeated applies never duplicate a jump.

use async_trait::async_trait;
use gremesh_common::{shell, MeshError, MeshResult};
use tracing::{info, warn};

use crate::backend::{BackendKind, ForwardBackend, RuleStats};
use crate::rules::ForwardRule;

/// Destination translation chain (nat/PREROUTING).
pub const DNAT_CHAIN: &str = "GMESH-DNAT";

/// Return-path address translation chain (nat/POSTROUTING).
pub const SNAT_CHAIN: &str = "GMESH-SNAT";

/// Forwarding accept chain (filter/FORWARD).
pub const FWD_CHAIN: &str = "GMESH-FWD";

/// (table, entry chain, owned chain) wiring for each function.
const CHAINS: &[(&str, &str, &str)] = &[
    ("nat", "PREROUTING", DNAT_CHAIN),
    ("nat", "POSTROUTING", SNAT_CHAIN),
    ("filter", "FORWARD", FWD_CHAIN),
];

/// Protocols forwarded for every rule.
const PROTOCOLS: &[&str] = &["tcp", "udp"];

/// Build chain creation command (fails harmlessly if it already exists)
pub fn build_new_chain_cmd(table: &str, chain: &str) -> String {
    format!("{} -t {} -N {}", shell::IPTABLES_CMD, table, chain)
}

/// Build chain flush command
pub fn build_flush_chain_cmd(table: &str, chain: &str) -> String {
    format!("{} -t {} -F {}", shell::IPTABLES_CMD, table, chain)
}

/// Build chain deletion command
pub fn build_delete_chain_cmd(table: &str, chain: &str) -> String {
    format!("{} -t {} -X {}", shell::IPTABLES_CMD, table, chain)
}

/// Build jump existence check command
pub fn build_check_jump_cmd(table: &str, entry: &str, chain: &str) -> String {
    format!("{} -t {} -C {} -j {}", shell::IPTABLES_CMD, table, entry, chain)
}

/// Build jump insertion command
pub fn build_add_jump_cmd(table: &str, entry: &str, chain: &str) -> String {
    format!("{} -t {} -A {} -j {}", shell::IPTABLES_CMD, table, entry, chain)
}

/// Build jump removal command
pub fn build_del_jump_cmd(table: &str, entry: &str, chain: &str) -> String {
    format!("{} -t {} -D {} -j {}", shell::IPTABLES_CMD, table, entry, chain)
}

/// Build the destination translation rule for one forward
pub fn build_dnat_rule_cmd(proto: &str, rule: &ForwardRule) -> String {
    // A wildcard listen address matches any destination
    let listen_match = if rule.listen_addr.is_unspecified() {
        String::new()
    } else {
        format!(" -d {}", rule.listen_addr)
    };
    format!(
        "{} -t nat -A {} -p {}{} --dport {} -j DNAT --to-destination {}:{}",
        shell::IPTABLES_CMD,
        DNAT_CHAIN,
        proto,
        listen_match,
        rule.listen_port,
        rule.dest_addr,
        rule.dest_port
    )
}

/// Build the return-path masquerade rule for one forward
pub fn build_masq_rule_cmd(proto: &str, rule: &ForwardRule) -> String {
    format!(
        "{} -t nat -A {} -p {} -d {} --dport {} -j MASQUERADE",
        shell::IPTABLES_CMD,
        SNAT_CHAIN,
        proto,
        rule.dest_addr,
        rule.dest_port
    )
}

/// Build the forwarding accept rule for one forward
pub fn build_accept_rule_cmd(proto: &str, rule: &ForwardRule) -> String {
    format!(
        "{} -t filter -A {} -p {} -d {} --dport {} -j ACCEPT",
        shell::IPTABLES_CMD,
        FWD_CHAIN,
        proto,
        rule.dest_addr,
        rule.dest_port
    )
}

/// Build the tooling availability probe
pub fn build_probe_cmd() -> String {
    format!("test -x {}", shell::IPTABLES_CMD)
}

/// NAT rule backend state.
pub struct NatRulesBackend {
    #[cfg(test)]
    mock_mode: bool,

    #[cfg(test)]
    captured_commands: Vec<String>,

    #[cfg(test)]
    fail_commands: Vec<String>,
}

impl NatRulesBackend {
    pub fn new() -> Self {
        Self {
            #[cfg(test)]
            mock_mode: false,
            #[cfg(test)]
            captured_commands: Vec::new(),
            #[cfg(test)]
            fail_commands: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn new_mock() -> Self {
        let mut backend = Self::new();
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

    /// Programs the six rules (tcp+udp across the three chains) for one
    /// forward.
    async fn apply_rule(&mut self, rule: &ForwardRule) -> MeshResult<()> {
        for &proto in PROTOCOLS {
            let cmds = [
                build_dnat_rule_cmd(proto, rule),
                build_masq_rule_cmd(proto, rule),
                build_accept_rule_cmd(proto, rule),
            ];
            for cmd in &cmds {
                self.exec(cmd)
                    .await
                    .map_err(|e| MeshError::kernel_programming(rule.to_string(), e.to_string()))?;
            }
        }
        Ok(())
    }
}

impl Default for NatRulesBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ForwardBackend for NatRulesBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NatRules
    }

    async fn available(&mut self) -> MeshResult<bool> {
        Ok(self.exec(&build_probe_cmd()).await.is_ok())
    }

    async fn clear(&mut self) -> MeshResult<()> {
        for &(table, entry, chain) in CHAINS {
            // Each step tolerates already-absent state
            let _ = self.exec(&build_del_jump_cmd(table, entry, chain)).await;
            let _ = self.exec(&build_flush_chain_cmd(table, chain)).await;
            let _ = self.exec(&build_delete_chain_cmd(table, chain)).await;
        }
        info!("NAT chains cleared");
        Ok(())
    }

    async fn apply(&mut self, rules: &[ForwardRule]) -> MeshResult<RuleStats> {
        for &(table, entry, chain) in CHAINS {
            // Creation fails when the chain already exists; the flush that
            // follows is what must succeed
            let _ = self.exec(&build_new_chain_cmd(table, chain)).await;
            self.exec(&build_flush_chain_cmd(table, chain))
                .await
                .map_err(|e| MeshError::kernel_programming(chain, e.to_string()))?;

            if self.exec(&build_check_jump_cmd(table, entry, chain)).await.is_err() {
                self.exec(&build_add_jump_cmd(table, entry, chain))
                    .await
                    .map_err(|e| MeshError::kernel_programming(chain, e.to_string()))?;
            }
        }

        let mut stats = RuleStats::default();
        for (idx, rule) in rules.iter().enumerate() {
            match self.apply_rule(rule).await {
                Ok(()) => stats.applied += 1,
                Err(e) => {
                    warn!(rule = idx + 1, "Skipping rule '{}': {}", rule, e);
                    stats.failed += 1;
                }
            }
        }
        info!(
            applied = stats.applied,
            failed = stats.failed,
            "NAT rules rebuilt"
        );
        Ok(stats)
    }
}
