//! QUIC listener: every bidirectional stream is one inbound connection.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::net::listener::{bind_addr, Accepted, ChannelListener, Listener, ListenerError, Producer};
use crate::net::tls::TlsError;
use crate::node::QuicConfig;

/// ALPN token offered by the QUIC listener.
pub const QUIC_ALPN: &[u8] = b"tunnel-proxy";

/// One QUIC stream pair as a byte stream.
#[derive(Debug)]
pub struct QuicStream {
    send: quinn::SendStream,
    recv: quinn::RecvStream,
}

impl QuicStream {
    pub fn new(send: quinn::SendStream, recv: quinn::RecvStream) -> Self {
        Self { send, recv }
    }
}

impl AsyncRead for QuicStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        AsyncRead::poll_read(Pin::new(&mut self.recv), cx, buf)
    }
}

impl AsyncWrite for QuicStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        AsyncWrite::poll_write(Pin::new(&mut self.send), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncWrite::poll_flush(Pin::new(&mut self.send), cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncWrite::poll_shutdown(Pin::new(&mut self.send), cx)
    }
}

/// Build the quinn server config from TLS material and QUIC options.
pub fn server_config(
    tls: &rustls::ServerConfig,
    quic: &QuicConfig,
) -> Result<quinn::ServerConfig, ListenerError> {
    let mut tls = tls.clone();
    tls.alpn_protocols = vec![QUIC_ALPN.to_vec()];
    let crypto = quinn::crypto::rustls::QuicServerConfig::try_from(tls)
        .map_err(|e| ListenerError::Tls(TlsError::Quic(e.to_string())))?;

    let mut transport = quinn::TransportConfig::default();
    if quic.keep_alive {
        transport.keep_alive_interval(Some(quic.keep_alive_interval()));
    }
    if !quic.idle_timeout.is_zero() {
        let idle = quinn::IdleTimeout::try_from(quic.idle_timeout)
            .map_err(|e| ListenerError::Tls(TlsError::Quic(e.to_string())))?;
        transport.max_idle_timeout(Some(idle));
    }

    let mut config = quinn::ServerConfig::with_crypto(Arc::new(crypto));
    config.transport_config(Arc::new(transport));
    Ok(config)
}

pub struct QuicListener {
    inner: ChannelListener,
}

impl QuicListener {
    pub async fn bind(
        addr: &str,
        tls: &rustls::ServerConfig,
        quic: &QuicConfig,
    ) -> Result<Self, ListenerError> {
        let config = server_config(tls, quic)?;
        let addr = bind_addr(addr);
        let socket_addr = tokio::net::lookup_host(&addr)
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ListenerError::Bind {
                addr: addr.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "unresolvable address"),
            })?;
        let endpoint = quinn::Endpoint::server(config, socket_addr)
            .map_err(|source| ListenerError::Bind { addr: addr.clone(), source })?;
        let local_addr = endpoint
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let (inner, producer) = ChannelListener::new(local_addr);
        tokio::spawn(connection_loop(endpoint, producer));

        tracing::debug!(
            address = %local_addr,
            keep_alive = quic.keep_alive,
            idle_timeout = ?quic.idle_timeout,
            keyed = quic.key.is_some(),
            "QUIC listener bound"
        );
        Ok(Self { inner })
    }
}

async fn connection_loop(endpoint: quinn::Endpoint, producer: Producer) {
    loop {
        let incoming = tokio::select! {
            _ = producer.closed() => break,
            incoming = endpoint.accept() => incoming,
        };
        let Some(incoming) = incoming else { break };
        let producer = producer.clone();
        tokio::spawn(async move {
            let connection = match incoming.await {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::debug!(error = %e, "QUIC handshake failed");
                    return;
                }
            };
            stream_loop(connection, producer).await;
        });
    }
    endpoint.close(0u32.into(), b"closed");
}

async fn stream_loop(connection: quinn::Connection, producer: Producer) {
    let peer_addr = connection.remote_address();
    loop {
        let streams = tokio::select! {
            _ = producer.closed() => return,
            streams = connection.accept_bi() => streams,
        };
        match streams {
            Ok((send, recv)) => {
                let accepted = Accepted {
                    stream: Box::new(QuicStream::new(send, recv)),
                    peer_addr,
                    permit: None,
                };
                if !producer.send(accepted).await {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(peer_addr = %peer_addr, error = %e, "QUIC connection ended");
                return;
            }
        }
    }
}

impl Listener for QuicListener {
    fn accept(&self) -> BoxFuture<'_, Result<Accepted, ListenerError>> {
        self.inner.accept()
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    fn close(&self) {
        self.inner.close();
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tls::{test_certs, TlsMaterial};
    use std::time::Duration;

    fn material() -> (tempfile::TempDir, rustls::ServerConfig) {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = test_certs::write_self_signed(dir.path());
        let material = TlsMaterial::load(cert.to_str().unwrap(), key.to_str().unwrap()).unwrap();
        let config = material.server_config(&[]).unwrap();
        (dir, config)
    }

    #[test]
    fn config_from_options() {
        let (_dir, tls) = material();
        let quic = QuicConfig::new(true, Duration::ZERO, Duration::from_secs(30), "secret");
        server_config(&tls, &quic).unwrap();
    }

    #[tokio::test]
    async fn binds_and_closes() {
        let (_dir, tls) = material();
        let quic = QuicConfig::new(false, Duration::ZERO, Duration::ZERO, "");
        let listener = QuicListener::bind("127.0.0.1:0", &tls, &quic).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);

        listener.close();
        assert!(listener.accept().await.unwrap_err().is_closed());
    }
}
