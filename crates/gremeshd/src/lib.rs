//! GRE tunnel mesh reconciler
//!
//! gremeshd reconciles one host's kernel tunnel state against a declarative
//! mesh description of point-to-point GRE links between iran and external
//! nodes:
//! - Sectioned topology parsing into ordered node and link collections
//! - Positional link ids driving the 10.10.<id>.0/30 address scheme
//! - Per-host role resolution (iran side .1, external side .2)
//! - Idempotent full teardown-then-apply interface reconciliation
//!
//! The host identity is an explicit parameter of every entry point; where
//! it persists between boots is the calling service wrapper's concern.

pub mod addressing;
pub mod commands;
pub mod roles;
pub mod topology;
pub mod tunnel_mgr;
pub mod types;

use std::path::Path;

use gremesh_common::MeshResult;

pub use topology::Topology;
pub use tunnel_mgr::{ReconcileOutcome, TunnelMgr};

/// Reconciles tunnel state for `node` from the topology file at `path`.
pub async fn setup(node: &str, path: &Path) -> MeshResult<ReconcileOutcome> {
    let topo = topology::load_topology(path)?;
    TunnelMgr::new().setup(node, &topo).await
}

/// Removes all tunnel interfaces without recreating anything.
///
/// Used when disabling tunnels without disabling the topology. Returns the
/// number of interfaces removed.
pub async fn teardown(node: &str) -> MeshResult<u32> {
    tracing::info!(node = node, "Tearing down all tunnel interfaces");
    TunnelMgr::new().teardown_all().await
}
