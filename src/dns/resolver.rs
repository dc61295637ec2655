//! Upstream resolver configuration.
//!
//! # Inline Grammar
//! ```text
//! 1.1.1.1/udp, 8.8.8.8, https://dns.example/dns-query, https-Chain://doh.example/q
//! ```
//!
//! # File Grammar
//! ```text
//! # comment
//! reload 1m
//! timeout 5s
//! ttl 60s
//! prefer ipv6
//! 1.1.1.1:853 tls cloudflare-dns.com
//! 8.8.8.8
//! ```
//!
//! The name servers are consumed by the protocol handlers; the core only
//! builds and reloads the list.

use std::fmt;
use std::io::BufRead;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::chain::Chain;
use crate::config::source::{self, LoaderError, Source};
use crate::lifecycle::Signal;
use crate::node::options::parse_duration;
use crate::reload::{self, split_line, ReloadError, Reloadable};

/// Timeout used when neither the resolver file nor the node sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheme marking DNS-over-HTTPS routed through the outbound chain.
pub const HTTPS_CHAIN_SCHEME: &str = "https-Chain";

/// One upstream name server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameServer {
    pub addr: String,
    /// `udp` when empty.
    pub protocol: String,
    /// TLS server name for encrypted protocols.
    pub hostname: String,
}

impl NameServer {
    pub fn new(addr: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            protocol: protocol.into(),
            hostname: String::new(),
        }
    }
}

impl fmt::Display for NameServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = if self.protocol.is_empty() { "udp" } else { &self.protocol };
        write!(f, "{}/{}", self.addr, proto)?;
        if !self.hostname.is_empty() {
            write!(f, "/{}", self.hostname)?;
        }
        Ok(())
    }
}

/// Address family preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Prefer {
    #[default]
    Ipv4,
    Ipv6,
}

impl Prefer {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("ipv6") {
            Prefer::Ipv6
        } else {
            Prefer::Ipv4
        }
    }
}

/// Options applied after construction by the router builder.
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    pub chain: Option<Arc<Chain>>,
    pub timeout: Duration,
    pub ttl: Duration,
    pub prefer: Option<Prefer>,
    pub src_ip: Option<IpAddr>,
}

#[derive(Debug, Default)]
struct Settings {
    servers: Vec<NameServer>,
    timeout: Duration,
    ttl: Duration,
    prefer: Option<Prefer>,
    period: Duration,
}

/// A reloadable list of name servers plus resolution settings.
#[derive(Debug, Default)]
pub struct Resolver {
    settings: ArcSwap<Settings>,
    options: Mutex<ResolverOptions>,
    stop: Signal,
}

impl Resolver {
    pub fn new(servers: Vec<NameServer>) -> Self {
        Self {
            settings: ArcSwap::from_pointee(Settings {
                servers,
                ..Settings::default()
            }),
            ..Self::default()
        }
    }

    /// Apply builder options.
    pub fn init(&self, options: ResolverOptions) {
        if let Ok(mut current) = self.options.lock() {
            *current = options;
        }
    }

    pub fn servers(&self) -> Vec<NameServer> {
        self.settings.load().servers.clone()
    }

    /// The chain DNS traffic is routed through, if any.
    pub fn chain(&self) -> Option<Arc<Chain>> {
        self.options.lock().ok().and_then(|o| o.chain.clone())
    }

    pub fn src_ip(&self) -> Option<IpAddr> {
        self.options.lock().ok().and_then(|o| o.src_ip)
    }

    /// File setting, else builder option, else [`DEFAULT_TIMEOUT`].
    pub fn timeout(&self) -> Duration {
        let file = self.settings.load().timeout;
        if !file.is_zero() {
            return file;
        }
        match self.options.lock() {
            Ok(o) if !o.timeout.is_zero() => o.timeout,
            _ => DEFAULT_TIMEOUT,
        }
    }

    /// File setting, else builder option. Zero means the record's own TTL.
    pub fn ttl(&self) -> Duration {
        let file = self.settings.load().ttl;
        if !file.is_zero() {
            return file;
        }
        self.options.lock().map(|o| o.ttl).unwrap_or_default()
    }

    pub fn prefer(&self) -> Prefer {
        self.settings
            .load()
            .prefer
            .or_else(|| self.options.lock().ok().and_then(|o| o.prefer))
            .unwrap_or_default()
    }
}

impl Reloadable for Resolver {
    fn reload(&self, reader: &mut dyn BufRead) -> Result<(), ReloadError> {
        if self.stopped() {
            return Ok(());
        }
        let mut next = Settings::default();
        for line in reader.lines() {
            let line = line?;
            match split_line(&line).as_slice() {
                [] => {}
                ["timeout", v, ..] => next.timeout = parse_duration(v).unwrap_or_default(),
                ["ttl", v, ..] => next.ttl = parse_duration(v).unwrap_or_default(),
                ["reload", v, ..] => next.period = parse_duration(v).unwrap_or_default(),
                ["prefer", v, ..] => next.prefer = Some(Prefer::parse(v)),
                [addr] => next.servers.push(NameServer::new(*addr, "")),
                [addr, proto] => next.servers.push(NameServer::new(*addr, *proto)),
                [addr, proto, hostname, ..] => next.servers.push(NameServer {
                    addr: addr.to_string(),
                    protocol: proto.to_string(),
                    hostname: hostname.to_string(),
                }),
            }
        }
        self.settings.store(Arc::new(next));
        Ok(())
    }

    fn period(&self) -> Option<Duration> {
        if self.stopped() {
            return None;
        }
        Some(self.settings.load().period)
    }

    fn stop_signal(&self) -> &Signal {
        &self.stop
    }
}

/// Parse one inline entry.
fn parse_inline_server(entry: &str) -> Option<NameServer> {
    if entry.starts_with("https") {
        // The scheme is compared as written, so only the exact literal
        // `https-Chain` selects chained DoH.
        let (scheme, rest) = entry.split_once(':')?;
        if scheme.is_empty() || rest.is_empty() {
            return None;
        }
        let protocol = if scheme == HTTPS_CHAIN_SCHEME { HTTPS_CHAIN_SCHEME } else { "https" };
        return Some(NameServer::new(entry, protocol));
    }
    match entry.split('/').collect::<Vec<_>>().as_slice() {
        [addr] => Some(NameServer::new(*addr, "")),
        [addr, proto] => Some(NameServer::new(*addr, *proto)),
        _ => None,
    }
}

/// Build a resolver from a `dns` option value.
///
/// A readable file is parsed with the file grammar and reloaded live;
/// anything else is an inline comma list.
pub fn parse_resolver(arg: &str) -> Result<Option<Arc<Resolver>>, LoaderError> {
    match source::open(arg)? {
        None => Ok(None),
        Some(Source::File { path, contents }) => {
            let resolver = Arc::new(Resolver::default());
            resolver
                .reload(&mut contents.as_bytes())
                .map_err(|e| LoaderError::parse("resolver", e.to_string()))?;
            reload::spawn(&resolver, path);
            Ok(Some(resolver))
        }
        Some(src @ Source::Inline(_)) => {
            let servers = src.entries().into_iter().filter_map(parse_inline_server).collect();
            Ok(Some(Arc::new(Resolver::new(servers))))
        }
    }
}
