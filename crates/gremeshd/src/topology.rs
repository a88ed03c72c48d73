//! Topology description parser
//!
//! The topology is a sectioned text file:
//!
//! ```text
//! [irans]
//! name=ipv4
//! [externals]
//! name=ipv4
//! [tunnels]
//! iranName,externalName
//! ```
//!
//! `#` starts a comment, surrounding whitespace is trimmed, unknown
//! sections are ignored for forward compatibility, and lines that match
//! no pattern are skipped without consuming a link ordinal.

use std::net::Ipv4Addr;
use std::path::Path;

use gremesh_common::{MeshError, MeshResult};
use tracing::{debug, warn};

/// A declared mesh node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub public_addr: Ipv4Addr,
}

/// A declared link between one iran node and one external node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDecl {
    pub iran_name: String,
    pub external_name: String,
}

/// The three ordered collections produced from the topology text.
///
/// Order mirrors declaration order exactly; link ids are derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    pub irans: Vec<Node>,
    pub externals: Vec<Node>,
    pub links: Vec<LinkDecl>,
}

/// Parser section state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// Before any recognized section header.
    Preamble,
    Irans,
    Externals,
    Tunnels,
    /// Inside an unrecognized section; contents ignored.
    Unknown,
}

impl Topology {
    /// Parses the topology description text.
    ///
    /// Unmatched lines are tolerated and skipped; duplicate link
    /// declarations are a structural error.
    pub fn parse(text: &str) -> MeshResult<Topology> {
        let mut topo = Topology::default();
        let mut section = Section::Preamble;

        for (lineno, raw) in text.lines().enumerate() {
            let lineno = lineno + 1;
            // Strip comments, then surrounding whitespace
            let line = match raw.split_once('#') {
                Some((before, _)) => before.trim(),
                None => raw.trim(),
            };
            if line.is_empty() {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                section = match line {
                    "[irans]" => Section::Irans,
                    "[externals]" => Section::Externals,
                    "[tunnels]" => Section::Tunnels,
                    other => {
                        debug!(section = other, line = lineno, "Ignoring unknown section");
                        Section::Unknown
                    }
                };
                continue;
            }

            match section {
                Section::Irans => parse_node_line(line, lineno, &mut topo.irans),
                Section::Externals => parse_node_line(line, lineno, &mut topo.externals),
                Section::Tunnels => parse_link_line(line, lineno, &mut topo.links)?,
                Section::Preamble | Section::Unknown => {
                    debug!(line = lineno, "Skipping line outside recognized sections");
                }
            }
        }

        Ok(topo)
    }

    /// Resolves a node name to its public address.
    ///
    /// Irans are searched before externals; the first match wins.
    pub fn resolve_address(&self, name: &str) -> Option<Ipv4Addr> {
        self.irans
            .iter()
            .chain(self.externals.iter())
            .find(|n| n.name == name)
            .map(|n| n.public_addr)
    }
}

fn parse_node_line(line: &str, lineno: usize, nodes: &mut Vec<Node>) {
    let Some((name, value)) = line.split_once('=') else {
        debug!(line = lineno, "Skipping non-node line");
        return;
    };
    let name = name.trim();
    let value = value.trim();
    if name.is_empty() || value.is_empty() {
        debug!(line = lineno, "Skipping node line with empty name or value");
        return;
    }
    let public_addr: Ipv4Addr = match value.parse() {
        Ok(addr) => addr,
        Err(_) => {
            warn!(
                node = name,
                value = value,
                line = lineno,
                "Skipping node with invalid IPv4 address"
            );
            return;
        }
    };
    if nodes.iter().any(|n| n.name == name) {
        warn!(
            node = name,
            line = lineno,
            "Duplicate node name in section; first declaration wins for lookup"
        );
    }
    nodes.push(Node {
        name: name.to_string(),
        public_addr,
    });
}

fn parse_link_line(line: &str, lineno: usize, links: &mut Vec<LinkDecl>) -> MeshResult<()> {
    let Some((iran, external)) = line.split_once(',') else {
        debug!(line = lineno, "Skipping non-link line in [tunnels]");
        return Ok(());
    };
    let iran = iran.trim();
    let external = external.trim();
    if iran.is_empty() || external.is_empty() {
        debug!(line = lineno, "Skipping link line with empty side");
        return Ok(());
    }
    if links
        .iter()
        .any(|l| l.iran_name == iran && l.external_name == external)
    {
        return Err(MeshError::malformed_topology(format!(
            "duplicate link declaration '{},{}' at line {}",
            iran, external, lineno
        )));
    }
    links.push(LinkDecl {
        iran_name: iran.to_string(),
        external_name: external.to_string(),
    });
    Ok(())
}

/// Loads and parses the topology description from disk.
///
/// An unreadable file is a [`MeshError::MalformedTopology`]: without the
/// description no reconcile can run.
pub fn load_topology(path: &Path) -> MeshResult<Topology> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        MeshError::malformed_topology(format!("cannot read {}: {}", path.display(), e))
    })?;
    Topology::parse(&text)
}
