//! One serve node at runtime.
//!
//! # Responsibilities
//! - Own the listener and handler built for a serve node
//! - Accept in a loop and run each connection in its own task
//! - Keep handler failures local to their connection
//! - Stop cleanly once the listener is closed
//!
//! # Design Decisions
//! - Transient accept errors back off exponentially instead of spinning
//! - The chain, resolver and hosts are shared with the handler, never copied

use std::sync::Arc;
use std::time::Duration;

use crate::chain::Chain;
use crate::dns::{Hosts, Resolver};
use crate::handler::Handler;
use crate::net::connection::ConnectionTracker;
use crate::net::{Listener, ListenerError};
use crate::node::Node;
use crate::observability::metrics;
use crate::resilience::backoff::Backoff;

/// Listener, handler and shared route state for one serve node.
pub struct Router {
    node: Arc<Node>,
    listener: Box<dyn Listener>,
    handler: Arc<dyn Handler>,
    chain: Arc<Chain>,
    resolver: Option<Arc<Resolver>>,
    hosts: Option<Arc<Hosts>>,
    tracker: ConnectionTracker,
}

impl Router {
    pub fn new(
        node: Arc<Node>,
        listener: Box<dyn Listener>,
        handler: Arc<dyn Handler>,
        chain: Arc<Chain>,
        resolver: Option<Arc<Resolver>>,
        hosts: Option<Arc<Hosts>>,
    ) -> Self {
        let tracker = ConnectionTracker::new(&node.addr);
        Self {
            node,
            listener,
            handler,
            chain,
            resolver,
            hosts,
            tracker,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn listener(&self) -> &dyn Listener {
        self.listener.as_ref()
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    pub fn resolver(&self) -> Option<&Arc<Resolver>> {
        self.resolver.as_ref()
    }

    pub fn hosts(&self) -> Option<&Arc<Hosts>> {
        self.hosts.as_ref()
    }

    /// Connections currently being handled.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Accept until closed.
    pub async fn serve(&self) -> Result<(), ListenerError> {
        tracing::info!("{} on {}", self.node, self.listener.local_addr());

        let protocol = self.handler.kind().name();
        let mut backoff = Backoff::new();
        loop {
            let conn = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(err) if err.is_closed() => {
                    tracing::debug!(node = %self.node, "Router stopped");
                    return Ok(());
                }
                Err(err) => {
                    metrics::record_accept_error();
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        node = %self.node,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "Accept failed"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };
            backoff.reset();

            let guard = self.tracker.track();
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let peer = conn.peer_addr;
                tracing::trace!(connection_id = %guard.id(), peer = %peer, "Connection accepted");
                if let Err(err) = handler.handle(conn).await {
                    metrics::record_handler_error(protocol);
                    tracing::debug!(
                        connection_id = %guard.id(),
                        peer = %peer,
                        protocol,
                        error = %err,
                        "Connection ended with error"
                    );
                }
            });
        }
    }

    /// Close the listener. `serve` returns once its pending accept fails.
    pub fn close(&self) {
        self.listener.close();
    }

    /// Wait up to `timeout` for in-flight connections. Returns whether all
    /// finished.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.wait_idle(timeout).await
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("node", &self.node)
            .field("addr", &self.listener.local_addr())
            .field("handler", self.handler.kind())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerKind, HandlerOptions, ProxyHandler};
    use crate::net::TcpListener;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn router(kind: HandlerKind, options: HandlerOptions) -> Arc<Router> {
        let node = Arc::new(Node::target(1, "127.0.0.1:0"));
        let listener = TcpListener::bind("127.0.0.1:0", 16).await.unwrap();
        let mut handler = ProxyHandler::new(kind);
        handler.init(options);
        Arc::new(Router::new(
            node,
            Box::new(listener),
            Arc::new(handler),
            Arc::new(Chain::default()),
            None,
            None,
        ))
    }

    #[tokio::test]
    async fn close_ends_serve() {
        let router = router(HandlerKind::Socks5, HandlerOptions::default()).await;
        let task = {
            let router = router.clone();
            tokio::spawn(async move { router.serve().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        router.close();
        let result = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn handler_errors_do_not_stop_the_router() {
        let router = router(HandlerKind::Socks5, HandlerOptions::default()).await;
        let addr = router.listener().local_addr();
        let task = {
            let router = router.clone();
            tokio::spawn(async move { router.serve().await })
        };

        for _ in 0..3 {
            let mut conn = tokio::net::TcpStream::connect(addr).await.unwrap();
            let mut buf = [0u8; 1];
            // The unsupported handler drops the connection.
            assert_eq!(conn.read(&mut buf).await.unwrap(), 0);
        }
        assert!(router.drain(Duration::from_secs(1)).await);

        router.close();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn forwards_through_the_router() {
        let target = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target_addr = target.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut conn, _) = target.accept().await.unwrap();
            conn.write_all(b"hello").await.unwrap();
        });

        let router = router(
            HandlerKind::TcpDirectForward {
                remote: target_addr.to_string(),
            },
            HandlerOptions::default(),
        )
        .await;
        let addr = router.listener().local_addr();
        let task = {
            let router = router.clone();
            tokio::spawn(async move { router.serve().await })
        };

        let mut conn = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut buf = Vec::new();
        conn.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello");

        router.close();
        task.await.unwrap().unwrap();
    }
}
