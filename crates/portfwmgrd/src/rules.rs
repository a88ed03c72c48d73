//! Port-forward rule list parsing
//!
//! One rule per line, four whitespace-separated fields:
//! `listenIp listenPort destIp destPort`. `#`-prefixed and blank lines
//! are ignored; malformed lines are skipped with a warning.

use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use tracing::warn;

/// A single forwarding rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRule {
    pub listen_addr: Ipv4Addr,
    pub listen_port: u16,
    pub dest_addr: Ipv4Addr,
    pub dest_port: u16,
}

impl std::fmt::Display for ForwardRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.listen_addr, self.listen_port, self.dest_addr, self.dest_port
        )
    }
}

impl FromStr for ForwardRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(format!("expected 4 fields, got {}", fields.len()));
        }
        let listen_addr: Ipv4Addr = fields[0]
            .parse()
            .map_err(|_| format!("invalid listen address '{}'", fields[0]))?;
        let listen_port: u16 = fields[1]
            .parse()
            .map_err(|_| format!("invalid listen port '{}'", fields[1]))?;
        let dest_addr: Ipv4Addr = fields[2]
            .parse()
            .map_err(|_| format!("invalid destination address '{}'", fields[2]))?;
        let dest_port: u16 = fields[3]
            .parse()
            .map_err(|_| format!("invalid destination port '{}'", fields[3]))?;
        Ok(ForwardRule {
            listen_addr,
            listen_port,
            dest_addr,
            dest_port,
        })
    }
}

/// Parses the rule file text into an ordered rule list.
///
/// Order carries no enforcement meaning but fixes display numbering.
pub fn parse_rules(text: &str) -> Vec<ForwardRule> {
    let mut rules = Vec::new();
    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<ForwardRule>() {
            Ok(rule) => rules.push(rule),
            Err(e) => warn!(line = lineno + 1, "Skipping malformed rule: {}", e),
        }
    }
    rules
}

/// Loads the rule list from disk.
///
/// A missing file is an empty list: applying no rules is how a cleared
/// configuration is expressed.
pub fn load_rules(path: &Path) -> Vec<ForwardRule> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_rules(&text),
        Err(e) => {
            warn!(path = %path.display(), "No rule file: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_rule() {
        let rule: ForwardRule = "0.0.0.0 8080 10.0.0.5 80".parse().unwrap();
        assert_eq!(rule.listen_addr, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(rule.listen_port, 8080);
        assert_eq!(rule.dest_addr, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(rule.dest_port, 80);
    }

    #[test]
    fn test_display_matches_file_format() {
        let rule: ForwardRule = "0.0.0.0 8080 10.0.0.5 80".parse().unwrap();
        assert_eq!(rule.to_string(), "0.0.0.0 8080 10.0.0.5 80");
    }

    #[test]
    fn test_parse_rules_skips_comments_and_garbage() {
        let text = "\
# forwards
0.0.0.0 8080 10.0.0.5 80

1.2.3.4 443 10.0.0.6 8443
not a rule at all
5.6.7.8 99999 10.0.0.7 80
";
        let rules = parse_rules(text);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].listen_port, 8080);
        assert_eq!(rules[1].dest_port, 8443);
    }

    #[test]
    fn test_parse_rule_errors() {
        assert!("0.0.0.0 8080 10.0.0.5".parse::<ForwardRule>().is_err());
        assert!("host 8080 10.0.0.5 80".parse::<ForwardRule>().is_err());
        assert!("0.0.0.0 -1 10.0.0.5 80".parse::<ForwardRule>().is_err());
    }

    #[test]
    fn test_load_rules_missing_file() {
        assert!(load_rules(Path::new("/nonexistent/portforward.rules")).is_empty());
    }

    #[test]
    fn test_load_rules_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portforward.rules");
        std::fs::write(&path, "0.0.0.0 8080 10.0.0.5 80\n").unwrap();

        let rules = load_rules(&path);
        assert_eq!(rules.len(), 1);
    }
}
