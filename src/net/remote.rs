//! Remote TCP forward listener.
//!
//! # Data Flow
//! ```text
//! accept():
//!     dial last hop → SOCKS5 greeting/auth → BIND serve addr
//!     → first reply (address bound on the hop)
//!     → second reply (peer connected) → stream handed to the handler
//! ```
//!
//! # Design Decisions
//! - One BIND per accepted connection; no session multiplexing
//! - With an empty chain, or a last hop that cannot bind, the serve address
//!   is bound locally instead

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::chain::Chain;
use crate::lifecycle::Signal;
use crate::net::listener::{
    Accepted, Listener, ListenerError, TcpListener, DEFAULT_MAX_CONNECTIONS,
};
use crate::net::socks::{self, Command, SocksError};
use crate::node::{Node, Transporter};
use crate::resilience::timeouts::{io_timeout, or_default, DEFAULT_DIAL_TIMEOUT};

/// Listener that accepts connections on the far side of the chain.
pub struct RemoteBindListener {
    addr: String,
    hop: Arc<Node>,
    local_addr: SocketAddr,
    closed: Signal,
}

impl RemoteBindListener {
    pub fn new(addr: &str, hop: Arc<Node>) -> Self {
        let local_addr = addr
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port_of(addr))));
        Self {
            addr: addr.to_string(),
            hop,
            local_addr,
            closed: Signal::new(),
        }
    }

    pub fn hop(&self) -> &Node {
        &self.hop
    }

    /// Greeting, auth and BIND request; returns the address bound on the hop.
    async fn negotiate(&self, stream: &mut TcpStream) -> Result<socks::ReplyAddr, SocksError> {
        socks::handshake(stream, self.hop.user.as_ref()).await?;
        let request = socks::build_request(Command::Bind, &self.addr)?;
        stream.write_all(&request).await?;
        socks::read_reply(stream).await
    }

    async fn bind_once(&self) -> Result<Accepted, ListenerError> {
        let timeout = or_default(self.hop.dial_options.timeout, DEFAULT_DIAL_TIMEOUT);
        let mut stream = io_timeout(timeout, "dial", TcpStream::connect(&self.hop.addr))
            .await
            .map_err(ListenerError::Accept)?;

        let bound = tokio::time::timeout(timeout, self.negotiate(&mut stream))
            .await
            .map_err(|_| {
                ListenerError::Accept(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "bind handshake timed out",
                ))
            })?
            .map_err(ListenerError::Socks)?;
        tracing::debug!(hop = %self.hop.addr, bound = ?bound, "Remote bind established");

        // The second reply arrives when a peer connects on the hop.
        let peer = socks::read_reply(&mut stream).await.map_err(ListenerError::Socks)?;
        Ok(Accepted {
            stream: Box::new(stream),
            peer_addr: peer.socket_addr(),
            permit: None,
        })
    }
}

fn port_of(addr: &str) -> u16 {
    crate::node::split_host_port(addr).1.parse().unwrap_or(0)
}

impl Listener for RemoteBindListener {
    fn accept(&self) -> BoxFuture<'_, Result<Accepted, ListenerError>> {
        async move {
            if self.closed.is_triggered() {
                return Err(ListenerError::Closed);
            }
            let closed = self.closed.subscribe();
            tokio::select! {
                _ = closed.fired() => Err(ListenerError::Closed),
                accepted = self.bind_once() => accepted,
            }
        }
        .boxed()
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn close(&self) {
        self.closed.trigger();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_triggered()
    }
}

/// Bind an `rtcp` serve address through `chain`.
///
/// A single plain-TCP hop that can carry a bind gets a remote bind. An empty
/// chain, or a last hop whose protocol cannot bind, listens locally.
pub async fn bind_remote(addr: &str, chain: &Chain) -> Result<Box<dyn Listener>, ListenerError> {
    let Some(hop) = chain.last_node() else {
        return Ok(Box::new(TcpListener::bind(addr, DEFAULT_MAX_CONNECTIONS).await?));
    };
    let Some(client) = &hop.client else {
        return Err(ListenerError::RemoteBind(format!("hop {} has no client", hop.addr)));
    };
    if !client.connector.supports_bind() {
        tracing::debug!(hop = %hop.addr, protocol = %hop.protocol, "Last hop cannot bind, listening locally");
        return Ok(Box::new(TcpListener::bind(addr, DEFAULT_MAX_CONNECTIONS).await?));
    }
    if chain.groups().len() > 1 {
        return Err(ListenerError::RemoteBind("multi-hop chains are not supported".into()));
    }
    if client.transporter != Transporter::Tcp {
        return Err(ListenerError::RemoteBind(format!(
            "hop {} uses transport {}",
            hop.addr, hop.transport
        )));
    }
    Ok(Box::new(RemoteBindListener::new(addr, hop)))
}
