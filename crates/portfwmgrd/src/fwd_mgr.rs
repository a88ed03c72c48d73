//! Port-forward manager
//!
//! Reads the persisted backend selector and the rule list, then applies
//! the selected backend with mutual exclusion: the non-selected backend's
//! enforcement state is cleared before the selected one is rebuilt, so a
//! backend switch leaves no artifacts of the previous choice.

use std::path::PathBuf;

use gremesh_common::{MeshError, MeshResult};
use tracing::{error, info};

use crate::backend::{BackendKind, ForwardBackend};
use crate::nat::NatRulesBackend;
use crate::proxy::{ProxyDaemonBackend, DEFAULT_RINETD_CONF};
use crate::rules::{self, ForwardRule};

/// Default location of the persisted backend selector.
pub const DEFAULT_BACKEND_PATH: &str = "/etc/gremesh/portforward.backend";

/// Default location of the rule list.
pub const DEFAULT_RULES_PATH: &str = "/etc/gremesh/portforward.rules";

/// Result of one apply call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Rules applied under the selected backend.
    Applied {
        backend: BackendKind,
        applied: u32,
        failed: u32,
    },
    /// No backend selected, or the selected backend's tooling is absent.
    NotConfigured,
}

/// Port-forward manager
///
/// Owns one apply call end to end; no state persists in memory between
/// invocations. Durable state is the selector file and the rule list.
pub struct FwdMgr {
    backend_path: PathBuf,
    rules_path: PathBuf,
    rinetd_conf: PathBuf,
}

impl FwdMgr {
    pub fn new() -> Self {
        Self {
            backend_path: PathBuf::from(DEFAULT_BACKEND_PATH),
            rules_path: PathBuf::from(DEFAULT_RULES_PATH),
            rinetd_conf: PathBuf::from(DEFAULT_RINETD_CONF),
        }
    }

    pub fn with_paths(backend_path: PathBuf, rules_path: PathBuf, rinetd_conf: PathBuf) -> Self {
        Self {
            backend_path,
            rules_path,
            rinetd_conf,
        }
    }

    /// Reads the persisted backend selector.
    ///
    /// A missing or empty file means no backend has been chosen yet; an
    /// unknown token is a configuration error.
    pub fn load_backend(&self) -> MeshResult<Option<BackendKind>> {
        let text = match std::fs::read_to_string(&self.backend_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MeshError::invalid_config(
                    "backend",
                    format!("cannot read {}: {}", self.backend_path.display(), e),
                ))
            }
        };
        let token = text.trim();
        if token.is_empty() {
            return Ok(None);
        }
        token.parse().map(Some)
    }

    /// Applies the persisted rule list under the persisted backend.
    pub async fn apply(&self) -> MeshResult<ApplyOutcome> {
        let Some(kind) = self.load_backend()? else {
            info!("No port-forward backend selected");
            return Ok(ApplyOutcome::NotConfigured);
        };

        let rules = rules::load_rules(&self.rules_path);
        info!(backend = %kind, rules = rules.len(), "Applying port forwards");

        let mut nat = NatRulesBackend::new();
        let mut proxy = ProxyDaemonBackend::new(self.rinetd_conf.clone());
        match kind {
            BackendKind::NatRules => switch_and_apply(&mut proxy, &mut nat, &rules).await,
            BackendKind::ProxyDaemon => switch_and_apply(&mut nat, &mut proxy, &rules).await,
        }
    }
}

impl Default for FwdMgr {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears `previous` and rebuilds `selected` from the rule list.
///
/// The clear-before-apply ordering is the mutual-exclusion invariant: at
/// most one backend's enforcement state exists afterwards.
pub async fn switch_and_apply(
    previous: &mut dyn ForwardBackend,
    selected: &mut dyn ForwardBackend,
    rules: &[ForwardRule],
) -> MeshResult<ApplyOutcome> {
    if !selected.available().await? {
        error!(
            "{}",
            MeshError::backend_unavailable(
                selected.kind().as_token(),
                "required tooling not found on this host",
            )
        );
        return Ok(ApplyOutcome::NotConfigured);
    }

    previous.clear().await?;
    let stats = selected.apply(rules).await?;
    Ok(ApplyOutcome::Applied {
        backend: selected.kind(),
        applied: stats.applied,
        failed: stats.failed,
    })
}
