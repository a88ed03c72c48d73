//! Link identity assignment and point-to-point address derivation
//!
//! Each syntactically valid link declaration gets a 1-based id from its
//! position in the topology text. The id is recomputed from the current
//! text on every reconcile and is never cached: every host parsing the
//! same description derives the same id for the same link, and the id in
//! turn fixes the link's address block.

use crate::topology::Topology;

/// First two octets of the mesh point-to-point address space.
pub const MESH_NET_PREFIX: &str = "10.10";

/// A link declaration with its positional id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkIdentity {
    /// 1-based position among all valid link declarations.
    pub id: u32,
    pub iran_name: String,
    pub external_name: String,
}

/// Assigns ids 1, 2, 3, ... to the topology's links in declaration order.
///
/// Pure and total: never fails, never reorders.
pub fn assign_link_ids(topo: &Topology) -> Vec<LinkIdentity> {
    topo.links
        .iter()
        .enumerate()
        .map(|(idx, link)| LinkIdentity {
            id: (idx + 1) as u32,
            iran_name: link.iran_name.clone(),
            external_name: link.external_name.clone(),
        })
        .collect()
}

/// The /30 address block reserved for a link.
pub fn block(id: u32) -> String {
    format!("{}.{}.0/30", MESH_NET_PREFIX, id)
}

/// The iran-side tunnel address of a link.
pub fn iran_addr(id: u32) -> String {
    format!("{}.{}.1", MESH_NET_PREFIX, id)
}

/// The external-side tunnel address of a link.
pub fn external_addr(id: u32) -> String {
    format!("{}.{}.2", MESH_NET_PREFIX, id)
}
