//! Port-forward enforcement manager
//!
//! portfwmgrd applies an ordered list of port-forward rules through one of
//! two mutually exclusive backends:
//! - NAT rules: dedicated iptables chains, rebuilt in place on every apply
//! - Proxy daemon: a fully regenerated rinetd configuration plus restart
//!
//! The backend choice is persisted as a single-token selector file so a
//! boot-time re-apply uses the same backend without re-prompting. Applying
//! with no selector is a soft "not configured" outcome, not a failure.

pub mod backend;
pub mod fwd_mgr;
pub mod nat;
pub mod proxy;
pub mod rules;

use std::path::PathBuf;

use gremesh_common::MeshResult;

pub use backend::{BackendKind, ForwardBackend, RuleStats};
pub use fwd_mgr::{ApplyOutcome, FwdMgr};
pub use rules::ForwardRule;

/// Applies the persisted rule list under the persisted backend selection.
pub async fn apply_port_forwards(
    backend_path: PathBuf,
    rules_path: PathBuf,
    rinetd_conf: PathBuf,
) -> MeshResult<ApplyOutcome> {
    FwdMgr::with_paths(backend_path, rules_path, rinetd_conf)
        .apply()
        .await
}
