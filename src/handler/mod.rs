//! Connection handlers.
//!
//! # Data Flow
//! ```text
//! serve node protocol (+ remote)
//!     → HandlerKind::for_node (the single tag → variant mapping)
//!     → ProxyHandler::init(HandlerOptions)   before the router serves
//!     → Router accept loop → handle(Accepted)
//!         → TcpDirectForward with an empty chain: forward.rs
//!         → anything else: HandlerError::Unsupported
//! ```
//!
//! # Design Decisions
//! - One handler type carries the kind and the full option set; wire
//!   protocols plug in behind `handle`
//! - Options are fixed at init; live state (bypass, hosts, resolver, peer
//!   groups) is shared through `Arc`s and reloads on its own

pub mod forward;

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::chain::{Chain, NodeGroup};
use crate::dns::{Hosts, Resolver};
use crate::load_balancer::SelectError;
use crate::net::Accepted;
use crate::node::{Credential, Node, Protocol};
use crate::routing::bypass::Bypass;
use crate::security::{Authenticator, Permissions};

/// Error type for per-connection handling.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0} handling is provided by the protocol engine")]
    Unsupported(&'static str),
    #[error("handler used before init")]
    NotInitialized,
    #[error("no forward target available: {0}")]
    NoTarget(#[from] SelectError),
    #[error("{target} denied by access rules")]
    Denied { target: String },
    #[error("dial {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What a handler does with an accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerKind {
    Socks5,
    Socks4,
    Http,
    Sni,
    Auto,
    Dns { remote: String },
    TcpDirectForward { remote: String },
    TcpRemoteForward { remote: String },
    UdpDirectForward { remote: String },
    UdpRemoteForward { remote: String },
}

impl HandlerKind {
    /// Map a serve node's protocol to a handler. Without an explicit
    /// protocol, a node with a remote is a TCP forward tunnel.
    pub fn for_node(protocol: Protocol, remote: &str) -> Self {
        let remote = remote.to_string();
        match protocol {
            Protocol::Socks5 => HandlerKind::Socks5,
            Protocol::Socks4 | Protocol::Socks4a => HandlerKind::Socks4,
            Protocol::Http => HandlerKind::Http,
            Protocol::Tcp => HandlerKind::TcpDirectForward { remote },
            Protocol::Rtcp => HandlerKind::TcpRemoteForward { remote },
            Protocol::Udp => HandlerKind::UdpDirectForward { remote },
            Protocol::Rudp => HandlerKind::UdpRemoteForward { remote },
            Protocol::Sni => HandlerKind::Sni,
            Protocol::Dns => HandlerKind::Dns { remote },
            Protocol::Auto | Protocol::Forward if !remote.is_empty() => {
                HandlerKind::TcpDirectForward { remote }
            }
            Protocol::Auto | Protocol::Forward => HandlerKind::Auto,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HandlerKind::Socks5 => "socks5",
            HandlerKind::Socks4 => "socks4",
            HandlerKind::Http => "http",
            HandlerKind::Sni => "sni",
            HandlerKind::Auto => "auto",
            HandlerKind::Dns { .. } => "dns",
            HandlerKind::TcpDirectForward { .. } => "tcp",
            HandlerKind::TcpRemoteForward { .. } => "rtcp",
            HandlerKind::UdpDirectForward { .. } => "udp",
            HandlerKind::UdpRemoteForward { .. } => "rudp",
        }
    }

    /// Forward target list, for the kinds that have one.
    pub fn remote(&self) -> Option<&str> {
        match self {
            HandlerKind::Dns { remote }
            | HandlerKind::TcpDirectForward { remote }
            | HandlerKind::TcpRemoteForward { remote }
            | HandlerKind::UdpDirectForward { remote }
            | HandlerKind::UdpRemoteForward { remote } => Some(remote),
            _ => None,
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a handler is initialized with.
#[derive(Clone, Default)]
pub struct HandlerOptions {
    /// The bound listener address.
    pub addr: String,
    pub chain: Arc<Chain>,
    pub user: Option<Credential>,
    pub authenticator: Option<Arc<dyn Authenticator>>,
    pub tls: Option<Arc<rustls::ServerConfig>>,
    pub whitelist: Option<Arc<Permissions>>,
    pub blacklist: Option<Arc<Permissions>>,
    pub strategy: String,
    pub max_fails: i64,
    pub fail_timeout: Duration,
    pub bypass: Option<Arc<Bypass>>,
    pub resolver: Option<Arc<Resolver>>,
    pub hosts: Option<Arc<Hosts>>,
    /// Overrides the chain's retry count when positive.
    pub retry: i64,
    pub timeout: Duration,
    pub probe_resist: String,
    pub knock: String,
    pub node: Option<Arc<Node>>,
    pub ips: Vec<String>,
    pub tcp_mode: bool,
}

impl HandlerOptions {
    /// Attempts per connection: the handler's retry, else the chain's, else one.
    pub fn attempts(&self) -> usize {
        if self.retry > 0 {
            self.retry as usize
        } else if self.chain.retries() > 0 {
            self.chain.retries() as usize
        } else {
            1
        }
    }
}

impl fmt::Debug for HandlerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("addr", &self.addr)
            .field("chain_groups", &self.chain.groups().len())
            .field("authenticator", &self.authenticator.is_some())
            .field("tls", &self.tls.is_some())
            .field("strategy", &self.strategy)
            .field("max_fails", &self.max_fails)
            .field("fail_timeout", &self.fail_timeout)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("ips", &self.ips)
            .field("tcp_mode", &self.tcp_mode)
            .finish_non_exhaustive()
    }
}

/// Handles accepted connections for one router.
pub trait Handler: Send + Sync {
    /// Apply the option set. Called once, before serving.
    fn init(&mut self, options: HandlerOptions);

    fn kind(&self) -> &HandlerKind;

    fn options(&self) -> &HandlerOptions;

    fn handle(&self, conn: Accepted) -> BoxFuture<'_, Result<(), HandlerError>>;
}

/// The handler every router uses.
#[derive(Debug)]
pub struct ProxyHandler {
    kind: HandlerKind,
    options: HandlerOptions,
    targets: Option<Arc<NodeGroup>>,
}

impl ProxyHandler {
    pub fn new(kind: HandlerKind) -> Self {
        Self {
            kind,
            options: HandlerOptions::default(),
            targets: None,
        }
    }

    /// Forward targets, once initialized.
    pub fn targets(&self) -> Option<&Arc<NodeGroup>> {
        self.targets.as_ref()
    }
}

impl Handler for ProxyHandler {
    fn init(&mut self, options: HandlerOptions) {
        if let HandlerKind::TcpDirectForward { remote } = &self.kind {
            self.targets = Some(Arc::new(forward::target_group(remote, &options)));
        }
        self.options = options;
    }

    fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    fn options(&self) -> &HandlerOptions {
        &self.options
    }

    fn handle(&self, conn: Accepted) -> BoxFuture<'_, Result<(), HandlerError>> {
        async move {
            match &self.kind {
                HandlerKind::TcpDirectForward { .. } if self.options.chain.is_empty() => {
                    let targets = self.targets.as_ref().ok_or(HandlerError::NotInitialized)?;
                    forward::forward_direct(&self.options, targets, conn).await
                }
                HandlerKind::TcpDirectForward { .. } => Err(HandlerError::Unsupported("chained tcp")),
                other => Err(HandlerError::Unsupported(other.name())),
            }
        }
        .boxed()
    }
}
