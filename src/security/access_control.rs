//! Destination permissions for whitelists and blacklists.
//!
//! # Grammar
//! ```text
//! rule  := actions ":" hosts ":" ports
//! rules := rule (" " rule)*
//! ```
//! Actions and hosts are comma lists of globs (`*` matches anything); ports
//! are comma lists of `n`, `a-b` or `*`.
//!
//! Example: `tcp,udp:*.example.com:80,443 connect:10.0.0.*:1000-2000`

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::routing::matcher::glob_match;

/// Error type for permission parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    #[error("invalid permission rule {0:?}: expected actions:hosts:ports")]
    Rule(String),
    #[error("invalid port range {0:?}")]
    Port(String),
}

/// A set of glob patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSet(Vec<String>);

impl PatternSet {
    fn parse(s: &str) -> Self {
        Self(
            s.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn contains(&self, subject: &str) -> bool {
        self.0
            .iter()
            .any(|pattern| pattern == "*" || glob_match(pattern, subject))
    }
}

/// A set of port ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSet(Vec<RangeInclusive<u16>>);

impl PortSet {
    fn parse(s: &str) -> Result<Self, PermissionError> {
        let mut ranges = Vec::new();
        for item in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            ranges.push(parse_port_range(item)?);
        }
        Ok(Self(ranges))
    }

    pub fn contains(&self, port: u16) -> bool {
        self.0.iter().any(|range| range.contains(&port))
    }
}

fn parse_port_range(s: &str) -> Result<RangeInclusive<u16>, PermissionError> {
    if s == "*" {
        return Ok(1..=u16::MAX);
    }
    let port = |p: &str| p.trim().parse::<u16>().map_err(|_| PermissionError::Port(s.to_string()));
    match s.split_once('-') {
        Some((lo, hi)) => {
            let (lo, hi) = (port(lo)?, port(hi)?);
            Ok(lo.min(hi)..=lo.max(hi))
        }
        None => {
            let p = port(s)?;
            Ok(p..=p)
        }
    }
}

/// One `actions:hosts:ports` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub actions: PatternSet,
    pub hosts: PatternSet,
    pub ports: PortSet,
}

/// An ordered list of rules; a request is permitted when any rule matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<Permission>);

impl Permissions {
    /// Whether `action` on `host:port` matches any rule.
    pub fn can(&self, action: &str, host: &str, port: u16) -> bool {
        self.0.iter().any(|p| {
            p.actions.contains(action) && p.hosts.contains(host) && p.ports.contains(port)
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for Permissions {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rules = Vec::new();
        for rule in s.split_whitespace() {
            let parts: Vec<&str> = rule.split(':').collect();
            let [actions, hosts, ports] = parts.as_slice() else {
                return Err(PermissionError::Rule(rule.to_string()));
            };
            rules.push(Permission {
                actions: PatternSet::parse(actions),
                hosts: PatternSet::parse(hosts),
                ports: PortSet::parse(ports)?,
            });
        }
        Ok(Self(rules))
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rule(s)", self.0.len())
    }
}

/// Parse a permission spec; empty means none.
pub fn parse_permissions(spec: &str) -> Result<Option<Permissions>, PermissionError> {
    if spec.trim().is_empty() {
        return Ok(None);
    }
    spec.parse().map(Some)
}

/// Whether a destination passes the whitelist and blacklist.
pub fn permitted(
    whitelist: Option<&Permissions>,
    blacklist: Option<&Permissions>,
    action: &str,
    host: &str,
    port: u16,
) -> bool {
    if let Some(w) = whitelist {
        if !w.can(action, host, port) {
            return false;
        }
    }
    if let Some(b) = blacklist {
        if b.can(action, host, port) {
            return false;
        }
    }
    true
}
