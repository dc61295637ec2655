//! DNS listener.
//!
//! Modes:
//! - `udp` (default): each datagram is one inbound connection whose writes
//!   go back to the querier
//! - `tcp`: plain TCP
//! - `tls`, `https`: TLS over TCP

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::UdpSocket;

use crate::net::listener::{
    bind_addr, Accepted, ChannelListener, Listener, ListenerError, Producer, TcpListener,
    DEFAULT_MAX_CONNECTIONS,
};
use crate::net::tls_listener::TlsListener;

/// Largest datagram read.
pub const MAX_DATAGRAM: usize = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsMode {
    Udp,
    Tcp,
    Tls,
}

impl DnsMode {
    pub fn parse(mode: &str) -> Result<Self, ListenerError> {
        match mode {
            "" | "udp" => Ok(DnsMode::Udp),
            "tcp" => Ok(DnsMode::Tcp),
            "tls" | "https" => Ok(DnsMode::Tls),
            other => Err(ListenerError::Mode(other.to_string())),
        }
    }
}

/// A single query datagram. Reads yield the query once; writes are sent back
/// to the querier.
#[derive(Debug)]
pub struct DatagramStream {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    data: Vec<u8>,
    pos: usize,
}

impl DatagramStream {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr, data: Vec<u8>) -> Self {
        Self {
            socket,
            peer,
            data,
            pos: 0,
        }
    }
}

impl AsyncRead for DatagramStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for DatagramStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.socket.poll_send_to(cx, buf, self.peer)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

enum Inner {
    Udp(ChannelListener),
    Tcp(TcpListener),
    Tls(TlsListener),
}

pub struct DnsListener {
    mode: DnsMode,
    inner: Inner,
}

impl DnsListener {
    pub async fn bind(
        addr: &str,
        mode: &str,
        tls: Option<Arc<rustls::ServerConfig>>,
    ) -> Result<Self, ListenerError> {
        let mode = DnsMode::parse(mode)?;
        let inner = match mode {
            DnsMode::Udp => Inner::Udp(bind_udp(addr).await?),
            DnsMode::Tcp => Inner::Tcp(TcpListener::bind(addr, DEFAULT_MAX_CONNECTIONS).await?),
            DnsMode::Tls => {
                let tls = tls.ok_or(ListenerError::MissingTls("dns"))?;
                Inner::Tls(TlsListener::bind(addr, tls, false).await?)
            }
        };
        Ok(Self { mode, inner })
    }

    pub fn mode(&self) -> DnsMode {
        self.mode
    }

    fn listener(&self) -> &dyn Listener {
        match &self.inner {
            Inner::Udp(l) => l,
            Inner::Tcp(l) => l,
            Inner::Tls(l) => l,
        }
    }
}

async fn bind_udp(addr: &str) -> Result<ChannelListener, ListenerError> {
    let addr = bind_addr(addr);
    let socket = UdpSocket::bind(&addr)
        .await
        .map_err(|source| ListenerError::Bind { addr: addr.clone(), source })?;
    let local_addr = socket
        .local_addr()
        .map_err(|source| ListenerError::Bind { addr, source })?;

    let (listener, producer) = ChannelListener::new(local_addr);
    tokio::spawn(datagram_loop(Arc::new(socket), producer));
    tracing::debug!(address = %local_addr, "DNS UDP listener bound");
    Ok(listener)
}

async fn datagram_loop(socket: Arc<UdpSocket>, producer: Producer) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            _ = producer.closed() => return,
            received = socket.recv_from(&mut buf) => received,
        };
        match received {
            Ok((n, peer)) => {
                let stream = DatagramStream::new(socket.clone(), peer, buf[..n].to_vec());
                let accepted = Accepted {
                    stream: Box::new(stream),
                    peer_addr: peer,
                    permit: None,
                };
                if !producer.send(accepted).await {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "DNS datagram receive failed");
            }
        }
    }
}

impl Listener for DnsListener {
    fn accept(&self) -> BoxFuture<'_, Result<Accepted, ListenerError>> {
        self.listener().accept()
    }

    fn local_addr(&self) -> SocketAddr {
        self.listener().local_addr()
    }

    fn close(&self) {
        self.listener().close();
    }

    fn is_closed(&self) -> bool {
        self.listener().is_closed()
    }
}
