//! Common infrastructure for the gremesh reconciliation daemons.
//!
//! This crate provides the pieces shared by `gremeshd` (tunnel
//! reconciliation) and `portfwmgrd` (port-forward enforcement):
//!
//! - [`shell`]: Safe shell command execution with proper quoting
//! - [`error`]: The workspace-wide error taxonomy
//!
//! # Architecture
//!
//! The daemons follow the same pattern:
//!
//! 1. Read the declarative description (topology or rule list) from disk
//! 2. Derive the desired kernel state for this host
//! 3. Execute shell commands to reconcile the Linux network stack
//! 4. Report per-entry failures without aborting sibling entries
//!
//! # Example
//!
//! ```ignore
//! use gremesh_common::{
//!     shell::{self, IP_CMD, shellquote},
//!     MeshResult,
//! };
//!
//! async fn bring_up(ifname: &str) -> MeshResult<()> {
//!     let cmd = format!("{} link set dev {} up", IP_CMD, shellquote(ifname));
//!     shell::exec_or_throw(&cmd).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod shell;

// Re-export commonly used items at crate root
pub use error::{MeshError, MeshResult};
