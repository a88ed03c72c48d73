//! Shell command builders for GRE tunnel operations

use std::net::Ipv4Addr;

use gremesh_common::shell;

use crate::types::{GRE_TTL, HOST_PREFIX_LEN, PTP_PREFIX_LEN};

/// Build the tunnel enumeration command
///
/// Lists every tunnel device currently known to the kernel
pub fn build_list_tunnels_cmd() -> String {
    format!("{} tunnel show", shell::IP_CMD)
}

/// Build GRE tunnel creation command
pub fn build_add_gre_tunnel_cmd(ifname: &str, local: Ipv4Addr, remote: Ipv4Addr) -> String {
    format!(
        "{} tunnel add {} mode gre local {} remote {} ttl {}",
        shell::IP_CMD,
        shell::shellquote(ifname),
        shell::shellquote(&local.to_string()),
        shell::shellquote(&remote.to_string()),
        GRE_TTL
    )
}

/// Build tunnel deletion command
pub fn build_del_tunnel_cmd(ifname: &str) -> String {
    format!(
        "{} tunnel del {}",
        shell::IP_CMD,
        shell::shellquote(ifname)
    )
}

/// Build interface bring-up command
pub fn build_set_link_up_cmd(ifname: &str) -> String {
    format!(
        "{} link set dev {} up",
        shell::IP_CMD,
        shell::shellquote(ifname)
    )
}

/// Build point-to-point address assignment command
///
/// Assigns the local /30 address to the tunnel interface
pub fn build_add_ptp_address_cmd(ifname: &str, local_addr: &str) -> String {
    format!(
        "{} addr add {} dev {}",
        shell::IP_CMD,
        shell::shellquote(&format!("{}/{}", local_addr, PTP_PREFIX_LEN)),
        shell::shellquote(ifname)
    )
}

/// Build host-route command for the remote point-to-point address
///
/// Uses 'replace' to handle existing routes gracefully.
pub fn build_add_peer_route_cmd(ifname: &str, remote_addr: &str) -> String {
    format!(
        "{} route replace {} dev {}",
        shell::IP_CMD,
        shell::shellquote(&format!("{}/{}", remote_addr, HOST_PREFIX_LEN)),
        shell::shellquote(ifname)
    )
}
