//! Inbound listeners with backpressure.
//!
//! # Responsibilities
//! - Bind serve addresses for every inbound transport
//! - Hand accepted connections out as boxed byte streams
//! - Enforce a connection limit via semaphore
//! - Fail pending and later accepts with [`ListenerError::Closed`] once closed
//!
//! # Design Decisions
//! - Transports that need a handshake (TLS, QUIC) or demultiplex datagrams
//!   run a producer task and feed a [`ChannelListener`], so one slow peer
//!   never stalls the accept path
//! - Closing is a sticky signal; dropping the listener frees the port

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, Semaphore};

use crate::lifecycle::Signal;
use crate::net::socks::SocksError;
use crate::net::tls::TlsError;

/// Connection slots per listener.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Accepted connections buffered by a producer task.
pub(crate) const ACCEPT_BACKLOG: usize = 128;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind { addr: String, source: io::Error },
    /// Failed to accept a connection. Transient.
    Accept(io::Error),
    /// The listener was closed.
    Closed,
    /// The transport needs TLS material and none was loaded.
    MissingTls(&'static str),
    /// TLS material could not be turned into a server config.
    Tls(TlsError),
    /// Unknown DNS listener mode.
    Mode(String),
    /// The chain cannot carry a remote bind.
    RemoteBind(String),
    /// Remote bind handshake failed. Transient.
    Socks(SocksError),
}

impl ListenerError {
    /// Whether the accept loop should stop.
    pub fn is_closed(&self) -> bool {
        matches!(self, ListenerError::Closed)
    }
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind { addr, source } => write!(f, "Failed to bind {}: {}", addr, source),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
            ListenerError::Closed => write!(f, "Listener closed"),
            ListenerError::MissingTls(transport) => {
                write!(f, "{} listener requires a certificate and key", transport)
            }
            ListenerError::Tls(e) => write!(f, "TLS setup failed: {}", e),
            ListenerError::Mode(mode) => write!(f, "Unknown DNS listener mode {:?}", mode),
            ListenerError::RemoteBind(reason) => write!(f, "Remote bind unavailable: {}", reason),
            ListenerError::Socks(e) => write!(f, "Remote bind failed: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind { source, .. } => Some(source),
            ListenerError::Accept(e) => Some(e),
            ListenerError::Tls(e) => Some(e),
            ListenerError::Socks(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TlsError> for ListenerError {
    fn from(e: TlsError) -> Self {
        ListenerError::Tls(e)
    }
}

/// Byte stream of an accepted connection.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxedStream = Box<dyn Stream>;

/// One accepted inbound connection.
pub struct Accepted {
    pub stream: BoxedStream,
    pub peer_addr: SocketAddr,
    /// Connection slot, released when dropped.
    pub permit: Option<ConnectionPermit>,
}

impl std::fmt::Debug for Accepted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accepted")
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

/// An inbound transport.
pub trait Listener: Send + Sync {
    /// Wait for the next connection.
    fn accept(&self) -> BoxFuture<'_, Result<Accepted, ListenerError>>;

    fn local_addr(&self) -> SocketAddr;

    /// Stop accepting. Pending accepts fail with [`ListenerError::Closed`].
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Turn a node address into something the OS can bind: an empty host
/// listens on all interfaces.
pub fn bind_addr(addr: &str) -> String {
    if addr.is_empty() {
        "0.0.0.0:0".to_string()
    } else if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    }
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections wait until a slot becomes available.
#[derive(Debug)]
pub struct TcpListener {
    inner: tokio::net::TcpListener,
    local_addr: SocketAddr,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
    closed: Signal,
}

impl TcpListener {
    pub async fn bind(addr: &str, max_connections: usize) -> Result<Self, ListenerError> {
        let addr = bind_addr(addr);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        tracing::debug!(
            address = %local_addr,
            max_connections,
            "TCP listener bound"
        );

        Ok(Self {
            inner: listener,
            local_addr,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
            closed: Signal::new(),
        })
    }

    /// Accept a raw TCP connection, respecting the connection limit.
    ///
    /// Returns the stream and a permit that must be held for the
    /// connection's lifetime.
    pub async fn accept_tcp(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        if self.closed.is_triggered() {
            return Err(ListenerError::Closed);
        }
        let closed = self.closed.subscribe();
        tokio::select! {
            _ = closed.fired() => Err(ListenerError::Closed),
            accepted = self.accept_bounded() => accepted,
        }
    }

    async fn accept_bounded(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Permit first, for backpressure.
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::trace!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

impl Listener for TcpListener {
    fn accept(&self) -> BoxFuture<'_, Result<Accepted, ListenerError>> {
        async move {
            let (stream, peer_addr, permit) = self.accept_tcp().await?;
            Ok(Accepted {
                stream: Box::new(stream),
                peer_addr,
                permit: Some(permit),
            })
        }
        .boxed()
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn close(&self) {
        self.closed.trigger();
        self.connection_limit.close();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_triggered()
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the slot is released back to the listener, even if the
/// handler panicked.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Listener fed by a producer task.
///
/// The producer gets a [`Producer`] handle; it stops when the listener is
/// closed or dropped.
pub struct ChannelListener {
    local_addr: SocketAddr,
    incoming: Mutex<mpsc::Receiver<Accepted>>,
    closed: Arc<Signal>,
}

/// Sending half of a [`ChannelListener`].
#[derive(Clone)]
pub struct Producer {
    tx: mpsc::Sender<Accepted>,
    closed: Arc<Signal>,
}

impl Producer {
    /// Queue an accepted connection. Returns false once the listener is gone.
    pub async fn send(&self, accepted: Accepted) -> bool {
        self.tx.send(accepted).await.is_ok()
    }

    /// Resolves when the listener is closed or dropped.
    pub async fn closed(&self) {
        let stop = self.closed.subscribe();
        tokio::select! {
            _ = stop.fired() => {}
            _ = self.tx.closed() => {}
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_triggered() || self.tx.is_closed()
    }
}

impl ChannelListener {
    pub fn new(local_addr: SocketAddr) -> (Self, Producer) {
        let (tx, rx) = mpsc::channel(ACCEPT_BACKLOG);
        let closed = Arc::new(Signal::new());
        let listener = Self {
            local_addr,
            incoming: Mutex::new(rx),
            closed: closed.clone(),
        };
        (listener, Producer { tx, closed })
    }
}

impl Listener for ChannelListener {
    fn accept(&self) -> BoxFuture<'_, Result<Accepted, ListenerError>> {
        async move {
            if self.closed.is_triggered() {
                return Err(ListenerError::Closed);
            }
            let closed = self.closed.subscribe();
            tokio::select! {
                _ = closed.fired() => Err(ListenerError::Closed),
                next = async { self.incoming.lock().await.recv().await } => {
                    next.ok_or(ListenerError::Closed)
                }
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn bind_addr_fills_host() {
        assert_eq!(bind_addr(":1080"), "0.0.0.0:1080");
        assert_eq!(bind_addr(""), "0.0.0.0:0");
        assert_eq!(bind_addr("127.0.0.1:80"), "127.0.0.1:80");
    }

    #[tokio::test]
    async fn tcp_accepts_and_bounds() {
        let listener = TcpListener::bind("127.0.0.1:0", 1).await.unwrap();
        let addr = listener.local_addr();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut accepted = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 0);

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        accepted.stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        // Limit reached: the second accept waits for the first slot.
        let _second = TcpStream::connect(addr).await.unwrap();
        assert!(tokio::time::timeout(Duration::from_millis(50), listener.accept())
            .await
            .is_err());

        drop(accepted);
        assert!(tokio::time::timeout(Duration::from_secs(1), listener.accept())
            .await
            .unwrap()
            .is_ok());
    }

    #[tokio::test]
    async fn close_fails_pending_accept() {
        let listener = Arc::new(TcpListener::bind("127.0.0.1:0", 4).await.unwrap());
        let pending = {
            let listener = listener.clone();
            tokio::spawn(async move { listener.accept().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        listener.close();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ListenerError::Closed)));
        assert!(listener.accept().await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn bind_conflict() {
        let first = TcpListener::bind("127.0.0.1:0", 1).await.unwrap();
        let taken = first.local_addr().to_string();
        let err = TcpListener::bind(&taken, 1).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[tokio::test]
    async fn channel_listener_close() {
        let (listener, producer) = ChannelListener::new("127.0.0.1:9".parse().unwrap());
        let (a, _b) = tokio::io::duplex(64);
        assert!(
            producer
                .send(Accepted {
                    stream: Box::new(a),
                    peer_addr: "127.0.0.1:1".parse().unwrap(),
                    permit: None,
                })
                .await
        );
        let accepted = listener.accept().await.unwrap();
        assert_eq!(accepted.peer_addr.port(), 1);

        listener.close();
        assert!(producer.is_closed());
        tokio::time::timeout(Duration::from_millis(100), producer.closed())
            .await
            .unwrap();
        assert!(listener.accept().await.unwrap_err().is_closed());
    }
}
