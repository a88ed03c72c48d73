//! Tunnel type definitions and constants

/// Prefix for reconciler-created tunnel interface names (gre1, gre2, ...)
pub const GRE_IF_PREFIX: &str = "gre";

/// TTL set on every GRE tunnel interface
pub const GRE_TTL: u32 = 255;

/// Prefix length of the per-link point-to-point address block
pub const PTP_PREFIX_LEN: u8 = 30;

/// Prefix length of the host route to the remote tunnel address
pub const HOST_PREFIX_LEN: u8 = 32;

/// Default location of the topology description
pub const DEFAULT_TOPOLOGY_PATH: &str = "/etc/gremesh/topology.conf";

/// Kernel fallback tunnel devices that exist independently of any
/// configuration and cannot be deleted.
pub const KERNEL_FALLBACK_DEVICES: &[&str] =
    &["gre0", "gretap0", "erspan0", "tunl0", "sit0", "ip6tnl0"];

/// Which side of a link this host is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The host is the iran-side endpoint (.1 address).
    Iran,
    /// The host is the external-side endpoint (.2 address).
    External,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Iran => "iran",
            Role::External => "external",
        }
    }
}
