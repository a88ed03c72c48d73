//! Tunnel Manager - two-phase reconciliation of GRE tunnel state
//!
//! Reconciliation is a full reset, not a diff: phase one removes every
//! tunnel device the kernel reports, phase two recreates the tunnels this
//! host participates in from the current topology. The trade-off is
//! documented on [`TunnelMgr::setup`].

#[cfg(test)]
use std::collections::HashMap;

use gremesh_common::{MeshError, MeshResult};
use tracing::{info, warn};

use crate::addressing::assign_link_ids;
use crate::commands::*;
use crate::roles::TunnelPlan;
use crate::topology::Topology;
use crate::types::{GRE_IF_PREFIX, KERNEL_FALLBACK_DEVICES};

/// Result of one reconcile call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The host participates in at least one link.
    Applied {
        /// Links whose tunnel was fully programmed.
        applied: u32,
        /// Links skipped because an endpoint address was missing.
        unresolved: u32,
        /// Links skipped because a kernel command failed.
        failed: u32,
    },
    /// The host is not an endpoint of any link.
    NothingToDo,
}

impl ReconcileOutcome {
    /// A reconcile succeeds when at least one link was applied, or when
    /// there was nothing to apply in the first place.
    pub fn succeeded(&self) -> bool {
        match self {
            ReconcileOutcome::Applied { applied, .. } => *applied > 0,
            ReconcileOutcome::NothingToDo => true,
        }
    }
}

/// Tunnel Manager
///
/// Owns the interface reconcile for one host for the duration of a single
/// setup/teardown call. No state persists between invocations.
pub struct TunnelMgr {
    #[cfg(test)]
    mock_mode: bool,

    #[cfg(test)]
    captured_commands: Vec<String>,

    #[cfg(test)]
    mock_outputs: HashMap<String, String>,

    #[cfg(test)]
    fail_commands: Vec<String>,
}

impl TunnelMgr {
    /// Create a new TunnelMgr instance
    pub fn new() -> Self {
        Self {
            #[cfg(test)]
            mock_mode: false,
            #[cfg(test)]
            captured_commands: Vec::new(),
            #[cfg(test)]
            mock_outputs: HashMap::new(),
            #[cfg(test)]
            fail_commands: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn new_mock() -> Self {
        let mut mgr = Self::new();
        mgr.mock_mode = true;
        mgr
    }

    #[cfg(test)]
    pub fn with_mock_output(mut self, cmd: &str, output: &str) -> Self {
        self.mock_outputs.insert(cmd.to_string(), output.to_string());
        self
    }

    #[cfg(test)]
    pub fn with_failing_command(mut self, fragment: &str) -> Self {
        self.fail_commands.push(fragment.to_string());
        self
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
            return Ok(self.mock_outputs.get(cmd).cloned().unwrap_or_default());
        }

        gremesh_common::shell::exec_or_throw(cmd).await
    }

    /// Reconciles kernel tunnel state against the topology for one host.
    ///
    /// Two phases, run to completion within this call:
    ///
    /// 1. Teardown: every tunnel device the kernel reports is removed,
    ///    whatever its name or origin. A full reset is self-healing
    ///    against orphans from older topology versions, at the cost of a
    ///    brief connectivity gap on every reconcile.
    /// 2. Apply: participant links are programmed in ascending link-id
    ///    order. Interface names are `gre1`, `gre2`, ... in creation
    ///    order, which diverges from link ids when earlier links do not
    ///    involve this host.
    ///
    /// Per-link failures are warned and counted; they never abort the
    /// remaining links.
    pub async fn setup(&mut self, node: &str, topo: &Topology) -> MeshResult<ReconcileOutcome> {
        let links = assign_link_ids(topo);
        info!(node = node, links = links.len(), "Reconciling tunnel state");

        let removed = self.teardown_all().await?;
        if removed > 0 {
            info!(removed = removed, "Removed existing tunnel interfaces");
        }

        let mut applied = 0u32;
        let mut unresolved = 0u32;
        let mut failed = 0u32;
        let mut next_ifnum = 0u32;

        for link in &links {
            let plan = match TunnelPlan::build(node, link, topo) {
                Ok(Some(plan)) => plan,
                Ok(None) => continue,
                Err(e) => {
                    warn!(link_id = link.id, "Skipping link: {}", e);
                    unresolved += 1;
                    continue;
                }
            };

            // Creation-order numbering: each attempted link consumes the
            // next name, so status lookups stay aligned with what the
            // kernel actually saw.
            next_ifnum += 1;
            let ifname = format!("{}{}", GRE_IF_PREFIX, next_ifnum);

            match self.apply_link(&ifname, &plan).await {
                Ok(()) => {
                    info!(
                        interface = %ifname,
                        link_id = plan.link_id,
                        role = plan.role.as_str(),
                        local = %plan.local_addr,
                        remote = %plan.remote_addr,
                        "Tunnel applied"
                    );
                    applied += 1;
                }
                Err(e) => {
                    warn!(
                        interface = %ifname,
                        link_id = plan.link_id,
                        "Skipping link: {}",
                        e
                    );
                    failed += 1;
                }
            }
        }

        if applied + unresolved + failed == 0 {
            info!(node = node, "No links involve this host; nothing to do");
            return Ok(ReconcileOutcome::NothingToDo);
        }

        let outcome = ReconcileOutcome::Applied {
            applied,
            unresolved,
            failed,
        };
        info!(
            node = node,
            applied = applied,
            unresolved = unresolved,
            failed = failed,
            "Reconcile complete"
        );
        Ok(outcome)
    }

    /// Programs one tunnel instance: device, admin-up, /30 address, host
    /// route to the remote point-to-point address.
    async fn apply_link(&mut self, ifname: &str, plan: &TunnelPlan) -> MeshResult<()> {
        let cmds = [
            build_add_gre_tunnel_cmd(ifname, plan.local_public, plan.remote_public),
            build_set_link_up_cmd(ifname),
            build_add_ptp_address_cmd(ifname, &plan.local_addr),
            build_add_peer_route_cmd(ifname, &plan.remote_addr),
        ];
        for cmd in &cmds {
            self.exec(cmd)
                .await
                .map_err(|e| MeshError::kernel_programming(ifname, e.to_string()))?;
        }
        Ok(())
    }

    /// Removes every tunnel device the kernel reports.
    ///
    /// Kernel fallback devices (gre0 and friends) are skipped since they
    /// cannot be deleted. Deletion errors are warned and ignored, matching
    /// the cleanup semantics of a full reset.
    pub async fn teardown_all(&mut self) -> MeshResult<u32> {
        let listing = self.exec(&build_list_tunnels_cmd()).await?;
        let mut removed = 0u32;
        for ifname in parse_tunnel_list(&listing) {
            match self.exec(&build_del_tunnel_cmd(&ifname)).await {
                Ok(_) => removed += 1,
                Err(e) => warn!(interface = %ifname, "Failed to delete tunnel: {}", e),
            }
        }
        Ok(removed)
    }

    #[cfg(test)]
    pub fn captured_commands(&self) -> &[String] {
        &self.captured_commands
    }
}

impl Default for TunnelMgr {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts deletable tunnel device names from `ip tunnel show` output.
///
/// Lines look like `gre1: gre/ip remote 1.2.3.4 local 5.6.7.8 ttl 255`.
fn parse_tunnel_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split(':').next())
        .map(str::trim)
        .filter(|name| !name.is_empty() && !KERNEL_FALLBACK_DEVICES.contains(name))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[irans]
iran1=5.6.7.8
iran2=5.6.7.9
[externals]
ext1=1.2.3.4
ext2=1.2.3.5
[tunnels]
iran1,ext1
iran1,ext2
";

    fn sample() -> Topology {
        Topology::parse(SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_tunnel_list() {
        let output = "\
gre0: gre/ip remote any local any ttl inherit
gre1: gre/ip remote 1.2.3.4 local 5.6.7.8 ttl 255
tun9: ipip/ip remote 9.9.9.9 local 8.8.8.8 ttl inherit";
        let names = parse_tunnel_list(output);
        assert_eq!(names, vec!["gre1".to_string(), "tun9".to_string()]);
    }

    #[test]
    fn test_parse_tunnel_list_empty() {
        assert!(parse_tunnel_list("").is_empty());
    }

    #[tokio::test]
    async fn test_setup_iran_host_two_links() {
        let mut mgr = TunnelMgr::new_mock();
        let outcome = mgr.setup("iran1", &sample()).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                applied: 2,
                unresolved: 0,
                failed: 0
            }
        );
        assert!(outcome.succeeded());

        let cmds = mgr.captured_commands();
        assert!(cmds[0].contains("ip tunnel show"));
        assert!(cmds
            .iter()
            .any(|c| c.contains("tunnel add \"gre1\"") && c.contains("remote \"1.2.3.4\"")));
        assert!(cmds
            .iter()
            .any(|c| c.contains("tunnel add \"gre2\"") && c.contains("remote \"1.2.3.5\"")));
        assert!(cmds
            .iter()
            .any(|c| c.contains("addr add \"10.10.1.1/30\" dev \"gre1\"")));
        assert!(cmds
            .iter()
            .any(|c| c.contains("addr add \"10.10.2.1/30\" dev \"gre2\"")));
        assert!(cmds
            .iter()
            .any(|c| c.contains("route replace \"10.10.1.2/32\" dev \"gre1\"")));
        assert!(cmds
            .iter()
            .any(|c| c.contains("route replace \"10.10.2.2/32\" dev \"gre2\"")));
    }

    #[tokio::test]
    async fn test_setup_external_host_one_link() {
        let mut mgr = TunnelMgr::new_mock();
        let outcome = mgr.setup("ext1", &sample()).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                applied: 1,
                unresolved: 0,
                failed: 0
            }
        );

        let cmds = mgr.captured_commands();
        // ext1 only participates in link 1 and sits on the .2 side
        assert!(cmds
            .iter()
            .any(|c| c.contains("tunnel add \"gre1\"") && c.contains("local \"1.2.3.4\"")));
        assert!(cmds
            .iter()
            .any(|c| c.contains("addr add \"10.10.1.2/30\" dev \"gre1\"")));
        assert!(cmds
            .iter()
            .any(|c| c.contains("route replace \"10.10.1.1/32\" dev \"gre1\"")));
        assert!(!cmds.iter().any(|c| c.contains("\"gre2\"")));
    }

    #[tokio::test]
    async fn test_interface_numbering_diverges_from_link_id() {
        // ext2 is only on link 2; its single interface is still gre1
        let mut mgr = TunnelMgr::new_mock();
        let outcome = mgr.setup("ext2", &sample()).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                applied: 1,
                unresolved: 0,
                failed: 0
            }
        );
        let cmds = mgr.captured_commands();
        assert!(cmds.iter().any(|c| c.contains("tunnel add \"gre1\"")));
        // The addresses still come from link id 2
        assert!(cmds
            .iter()
            .any(|c| c.contains("addr add \"10.10.2.2/30\" dev \"gre1\"")));
    }

    #[tokio::test]
    async fn test_setup_nothing_to_do() {
        let mut mgr = TunnelMgr::new_mock();
        let outcome = mgr.setup("iran2", &sample()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::NothingToDo);
        assert!(outcome.succeeded());
        // Teardown phase still ran
        assert_eq!(mgr.captured_commands().len(), 1);
        assert!(mgr.captured_commands()[0].contains("ip tunnel show"));
    }

    #[tokio::test]
    async fn test_unresolved_endpoint_isolated() {
        let text = "\
[irans]
iran1=5.6.7.8
[externals]
ext1=1.2.3.4
[tunnels]
iran1,ghost
iran1,ext1
";
        let topo = Topology::parse(text).unwrap();
        let mut mgr = TunnelMgr::new_mock();
        let outcome = mgr.setup("iran1", &topo).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                applied: 1,
                unresolved: 1,
                failed: 0
            }
        );
        assert!(outcome.succeeded());

        // The unresolved link consumed no interface name: the valid link
        // (id 2) got gre1 with link-2 addressing
        let cmds = mgr.captured_commands();
        assert!(cmds
            .iter()
            .any(|c| c.contains("addr add \"10.10.2.1/30\" dev \"gre1\"")));
    }

    #[tokio::test]
    async fn test_kernel_failure_isolated() {
        let mut mgr = TunnelMgr::new_mock().with_failing_command("tunnel add \"gre1\"");
        let outcome = mgr.setup("iran1", &sample()).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                applied: 1,
                unresolved: 0,
                failed: 1
            }
        );
        assert!(outcome.succeeded());

        // The failed link consumed gre1; the second link still got gre2
        let cmds = mgr.captured_commands();
        assert!(cmds.iter().any(|c| c.contains("tunnel add \"gre2\"")));
        // Address/route programming for the failed link never ran
        assert!(!cmds.iter().any(|c| c.contains("dev \"gre1\" up")));
    }

    #[tokio::test]
    async fn test_all_links_failing_is_not_success() {
        let mut mgr = TunnelMgr::new_mock().with_failing_command("tunnel add");
        let outcome = mgr.setup("iran1", &sample()).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Applied {
                applied: 0,
                unresolved: 0,
                failed: 2
            }
        );
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn test_setup_idempotent_command_sequence() {
        let topo = sample();
        let mut mgr = TunnelMgr::new_mock();

        mgr.setup("iran1", &topo).await.unwrap();
        let first = mgr.captured_commands().to_vec();

        mgr.setup("iran1", &topo).await.unwrap();
        let all = mgr.captured_commands().to_vec();
        let second = &all[first.len()..];

        assert_eq!(first.as_slice(), second);
    }

    #[tokio::test]
    async fn test_teardown_removes_listed_tunnels() {
        let listing = "\
gre0: gre/ip remote any local any ttl inherit
gre1: gre/ip remote 1.2.3.4 local 5.6.7.8 ttl 255
gre2: gre/ip remote 1.2.3.5 local 5.6.7.8 ttl 255";
        let mut mgr =
            TunnelMgr::new_mock().with_mock_output(&build_list_tunnels_cmd(), listing);

        let removed = mgr.teardown_all().await.unwrap();
        assert_eq!(removed, 2);

        let cmds = mgr.captured_commands();
        assert!(cmds.iter().any(|c| c.contains("tunnel del \"gre1\"")));
        assert!(cmds.iter().any(|c| c.contains("tunnel del \"gre2\"")));
        assert!(!cmds.iter().any(|c| c.contains("tunnel del \"gre0\"")));
    }

    #[tokio::test]
    async fn test_teardown_ignores_delete_failures() {
        let listing = "\
gre1: gre/ip remote 1.2.3.4 local 5.6.7.8 ttl 255
gre2: gre/ip remote 1.2.3.5 local 5.6.7.8 ttl 255";
        let mut mgr = TunnelMgr::new_mock()
            .with_mock_output(&build_list_tunnels_cmd(), listing)
            .with_failing_command("tunnel del \"gre1\"");

        let removed = mgr.teardown_all().await.unwrap();
        assert_eq!(removed, 1);
    }
}
