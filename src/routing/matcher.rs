//! Destination matching.
//!
//! # Responsibilities
//! - Match an IP address exactly
//! - Match an IP address against a CIDR network
//! - Match a domain name against a glob
//!
//! # Design Decisions
//! - Domain matching is case-insensitive
//! - A leading `.` matches the domain itself and every subdomain
//! - Globs support `*` and `?` only; no regex, so matching stays linear

use std::net::IpAddr;

use ipnet::IpNet;

/// A single destination pattern.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if `addr` (a host without port) matches.
    fn matches(&self, addr: &str) -> bool;
}

/// Build the matcher a pattern describes: IP, then CIDR, then domain glob.
pub fn new_matcher(pattern: &str) -> Option<Box<dyn Matcher>> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return None;
    }
    if let Ok(ip) = pattern.parse::<IpAddr>() {
        return Some(Box::new(IpMatcher(ip)));
    }
    if let Ok(net) = pattern.parse::<IpNet>() {
        return Some(Box::new(CidrMatcher(net)));
    }
    Some(Box::new(DomainMatcher::new(pattern)))
}

/// Matches one IP address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpMatcher(pub IpAddr);

impl Matcher for IpMatcher {
    fn matches(&self, addr: &str) -> bool {
        parse_ip(addr).is_some_and(|ip| ip == self.0)
    }
}

/// Matches any address inside a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrMatcher(pub IpNet);

impl Matcher for CidrMatcher {
    fn matches(&self, addr: &str) -> bool {
        parse_ip(addr).is_some_and(|ip| self.0.contains(&ip))
    }
}

/// Matches domain names by glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainMatcher {
    /// The bare domain, without a leading `.`.
    domain: String,
    glob: String,
}

impl DomainMatcher {
    pub fn new(pattern: &str) -> Self {
        let pattern = pattern.to_ascii_lowercase();
        match pattern.strip_prefix('.') {
            Some(domain) => Self {
                domain: domain.to_string(),
                glob: format!("*.{domain}"),
            },
            None => Self {
                domain: pattern.clone(),
                glob: pattern,
            },
        }
    }
}

impl Matcher for DomainMatcher {
    fn matches(&self, addr: &str) -> bool {
        let addr = addr.to_ascii_lowercase();
        addr == self.domain || glob_match(&self.glob, &addr)
    }
}

fn parse_ip(addr: &str) -> Option<IpAddr> {
    addr.trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}

/// Glob match with `*` (any run, including empty) and `?` (one character).
pub fn glob_match(pattern: &str, subject: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = subject.chars().collect();
    let (mut pi, mut si) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while si < s.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == s[si]) {
            pi += 1;
            si += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, si));
            pi += 1;
        } else if let Some((star_pi, star_si)) = star {
            pi = star_pi + 1;
            si = star_si + 1;
            star = Some((star_pi, star_si + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globs() {
        assert!(glob_match("*", ""));
        assert!(glob_match("*.example.com", "a.b.example.com"));
        assert!(!glob_match("*.example.com", "example.com"));
        assert!(glob_match("10.0.0.?", "10.0.0.7"));
        assert!(!glob_match("10.0.0.?", "10.0.0.17"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
    }

    #[test]
    fn ip_and_cidr() {
        let ip = new_matcher("192.168.1.1").unwrap();
        assert!(ip.matches("192.168.1.1"));
        assert!(!ip.matches("192.168.1.2"));
        assert!(!ip.matches("example.com"));

        let net = new_matcher("10.0.0.0/8").unwrap();
        assert!(net.matches("10.20.30.40"));
        assert!(!net.matches("11.0.0.1"));

        let v6 = new_matcher("fd00::/8").unwrap();
        assert!(v6.matches("[fd00::1]"));
    }

    #[test]
    fn domains() {
        let exact = new_matcher("Example.com").unwrap();
        assert!(exact.matches("example.COM"));
        assert!(!exact.matches("www.example.com"));

        let suffix = new_matcher(".example.com").unwrap();
        assert!(suffix.matches("example.com"));
        assert!(suffix.matches("a.example.com"));
        assert!(!suffix.matches("badexample.com"));

        let glob = new_matcher("*.internal").unwrap();
        assert!(glob.matches("foo.internal"));
        assert!(!glob.matches("foo.external"));
    }

    #[test]
    fn empty_pattern() {
        assert!(new_matcher("  ").is_none());
    }
}
