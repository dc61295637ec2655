//! TLS listener with handshakes off the accept path.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio_rustls::TlsAcceptor;

use crate::net::listener::{
    Accepted, ChannelListener, Listener, ListenerError, Producer, TcpListener,
    DEFAULT_MAX_CONNECTIONS,
};
use crate::resilience::backoff::Backoff;

/// Deadline for a client to finish its TLS handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP plus TLS. The `mtls` flavour is the same listener flagged as
/// multiplexed; session multiplexing belongs to the protocol layer.
pub struct TlsListener {
    inner: ChannelListener,
    multiplex: bool,
}

impl TlsListener {
    pub async fn bind(
        addr: &str,
        config: Arc<rustls::ServerConfig>,
        multiplex: bool,
    ) -> Result<Self, ListenerError> {
        let tcp = TcpListener::bind(addr, DEFAULT_MAX_CONNECTIONS).await?;
        let (inner, producer) = ChannelListener::new(tcp.local_addr());
        tokio::spawn(handshake_loop(tcp, TlsAcceptor::from(config), producer));

        tracing::debug!(address = %inner.local_addr(), multiplex, "TLS listener bound");
        Ok(Self { inner, multiplex })
    }

    pub fn is_multiplexed(&self) -> bool {
        self.multiplex
    }
}

async fn handshake_loop(tcp: TcpListener, acceptor: TlsAcceptor, producer: Producer) {
    let mut backoff = Backoff::new();
    loop {
        let accepted = tokio::select! {
            _ = producer.closed() => break,
            accepted = tcp.accept_tcp() => accepted,
        };
        let (stream, peer_addr, permit) = match accepted {
            Ok(accepted) => {
                backoff.reset();
                accepted
            }
            Err(ListenerError::Closed) => break,
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::warn!(error = %e, retry_in = ?delay, "TLS listener accept failed");
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let producer = producer.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(tls)) => {
                    producer
                        .send(Accepted {
                            stream: Box::new(tls),
                            peer_addr,
                            permit: Some(permit),
                        })
                        .await;
                }
                Ok(Err(e)) => {
                    tracing::debug!(peer_addr = %peer_addr, error = %e, "TLS handshake failed");
                }
                Err(_) => {
                    tracing::debug!(peer_addr = %peer_addr, "TLS handshake timed out");
                }
            }
        });
    }
    tcp.close();
    tracing::debug!(address = %tcp.local_addr(), "TLS listener stopped");
}

impl Listener for TlsListener {
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
