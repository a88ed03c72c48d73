//! Role resolution: which side of each link a host is, if any
//!
//! Equality is exact string match against the link's declared names. A
//! self-referential link (same name on both sides) is a configuration
//! smell; it is warned about and deterministically resolved iran-side.

use std::net::Ipv4Addr;

use gremesh_common::{MeshError, MeshResult};
use tracing::warn;

use crate::addressing::{self, LinkIdentity};
use crate::topology::Topology;
use crate::types::Role;

/// Decides which side of a link the host is, or `None` for non-participants.
pub fn resolve_role(node: &str, link: &LinkIdentity) -> Option<Role> {
    if node == link.iran_name {
        if node == link.external_name {
            warn!(
                link_id = link.id,
                node = node,
                "Self-referential link declaration; resolving iran-side"
            );
        }
        Some(Role::Iran)
    } else if node == link.external_name {
        Some(Role::External)
    } else {
        None
    }
}

/// Everything needed to program one tunnel instance for this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelPlan {
    /// The link's positional id (drives the address block).
    pub link_id: u32,
    pub role: Role,
    /// Local point-to-point address (10.10.<id>.1 or .2).
    pub local_addr: String,
    /// Remote point-to-point address (the other suffix).
    pub remote_addr: String,
    /// This host's public address.
    pub local_public: Ipv4Addr,
    /// The peer's public address.
    pub remote_public: Ipv4Addr,
}

impl TunnelPlan {
    /// Builds the plan for one link on one host.
    ///
    /// Returns `Ok(None)` when the host is not an endpoint of the link,
    /// and `Err(UnresolvedEndpoint)` when either endpoint's public
    /// address is missing from the topology. Callers isolate that error
    /// to the link.
    pub fn build(
        node: &str,
        link: &LinkIdentity,
        topo: &Topology,
    ) -> MeshResult<Option<TunnelPlan>> {
        let Some(role) = resolve_role(node, link) else {
            return Ok(None);
        };

        let iran_public = topo.resolve_address(&link.iran_name).ok_or_else(|| {
            MeshError::unresolved_endpoint(
                link.id,
                &link.iran_name,
                &link.external_name,
                &link.iran_name,
            )
        })?;
        let external_public = topo.resolve_address(&link.external_name).ok_or_else(|| {
            MeshError::unresolved_endpoint(
                link.id,
                &link.iran_name,
                &link.external_name,
                &link.external_name,
            )
        })?;

        let (local_addr, remote_addr, local_public, remote_public) = match role {
            Role::Iran => (
                addressing::iran_addr(link.id),
                addressing::external_addr(link.id),
                iran_public,
                external_public,
            ),
            Role::External => (
                addressing::external_addr(link.id),
                addressing::iran_addr(link.id),
                external_public,
                iran_public,
            ),
        };

        Ok(Some(TunnelPlan {
            link_id: link.id,
            role,
            local_addr,
            remote_addr,
            local_public,
            remote_public,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::assign_link_ids;

    const SAMPLE: &str = "\
[irans]
iran1=5.6.7.8
[externals]
ext1=1.2.3.4
ext2=1.2.3.5
[tunnels]
iran1,ext1
iran1,ext2
";

    fn sample() -> (Topology, Vec<LinkIdentity>) {
        let topo = Topology::parse(SAMPLE).unwrap();
        let links = assign_link_ids(&topo);
        (topo, links)
    }

    #[test]
    fn test_resolve_role() {
        let (_, links) = sample();
        assert_eq!(resolve_role("iran1", &links[0]), Some(Role::Iran));
        assert_eq!(resolve_role("ext1", &links[0]), Some(Role::External));
        assert_eq!(resolve_role("ext2", &links[0]), None);
        assert_eq!(resolve_role("stranger", &links[0]), None);
    }

    #[test]
    fn test_self_loop_resolves_iran_side() {
        let link = LinkIdentity {
            id: 1,
            iran_name: "dual".to_string(),
            external_name: "dual".to_string(),
        };
        assert_eq!(resolve_role("dual", &link), Some(Role::Iran));
    }

    #[test]
    fn test_plan_iran_side() {
        let (topo, links) = sample();

        let plan = TunnelPlan::build("iran1", &links[0], &topo).unwrap().unwrap();
        assert_eq!(plan.link_id, 1);
        assert_eq!(plan.role, Role::Iran);
        assert_eq!(plan.local_addr, "10.10.1.1");
        assert_eq!(plan.remote_addr, "10.10.1.2");
        assert_eq!(plan.local_public, "5.6.7.8".parse::<Ipv4Addr>().unwrap());
        assert_eq!(plan.remote_public, "1.2.3.4".parse::<Ipv4Addr>().unwrap());

        let plan = TunnelPlan::build("iran1", &links[1], &topo).unwrap().unwrap();
        assert_eq!(plan.link_id, 2);
        assert_eq!(plan.local_addr, "10.10.2.1");
        assert_eq!(plan.remote_addr, "10.10.2.2");
    }

    #[test]
    fn test_plan_external_side() {
        let (topo, links) = sample();

        let plan = TunnelPlan::build("ext1", &links[0], &topo).unwrap().unwrap();
        assert_eq!(plan.role, Role::External);
        assert_eq!(plan.local_addr, "10.10.1.2");
        assert_eq!(plan.remote_addr, "10.10.1.1");
        assert_eq!(plan.local_public, "1.2.3.4".parse::<Ipv4Addr>().unwrap());
        assert_eq!(plan.remote_public, "5.6.7.8".parse::<Ipv4Addr>().unwrap());

        // ext1 is not part of link 2
        assert_eq!(TunnelPlan::build("ext1", &links[1], &topo).unwrap(), None);
    }

    #[test]
    fn test_plan_unresolved_endpoint() {
        let text = "\
[irans]
iran1=5.6.7.8
[tunnels]
iran1,ghost
";
        let topo = Topology::parse(text).unwrap();
        let links = assign_link_ids(&topo);

        let err = TunnelPlan::build("iran1", &links[0], &topo).unwrap_err();
        match err {
            MeshError::UnresolvedEndpoint { link_id, name, .. } => {
                assert_eq!(link_id, 1);
                assert_eq!(name, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_participant_before_resolution() {
        // Unresolvable links are not an error for hosts that are not on them
        let text = "\
[tunnels]
iran1,ghost
";
        let topo = Topology::parse(text).unwrap();
        let links = assign_link_ids(&topo);
        assert_eq!(TunnelPlan::build("other", &links[0], &topo).unwrap(), None);
    }
}
