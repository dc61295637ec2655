//! Router startup and orderly stop.
//!
//! # Responsibilities
//! - Spawn one serve task per router
//! - Close every router on shutdown and wait for the serve tasks
//! - Give in-flight connections a bounded time to finish
//!
//! # Design Decisions
//! - Routers are started only after the whole configuration built, so a
//!   build error never leaves a partial set serving
//! - A router whose serve task fails is logged; its siblings keep running

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::net::ListenerError;
use crate::routing::Router;

/// How long shutdown waits for in-flight connections.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Routers that are serving.
#[derive(Debug)]
pub struct RunningRouters {
    routers: Vec<Arc<Router>>,
    tasks: Vec<JoinHandle<Result<(), ListenerError>>>,
}

/// Start serving every router.
pub fn serve_all(routers: Vec<Router>) -> RunningRouters {
    let routers: Vec<Arc<Router>> = routers.into_iter().map(Arc::new).collect();
    let tasks = routers
        .iter()
        .map(|router| {
            let router = Arc::clone(router);
            tokio::spawn(async move {
                let result = router.serve().await;
                if let Err(err) = &result {
                    tracing::error!(node = %router.node(), error = %err, "Router failed");
                }
                result
            })
        })
        .collect();
    RunningRouters { routers, tasks }
}

impl RunningRouters {
    pub fn routers(&self) -> &[Arc<Router>] {
        &self.routers
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    /// Close every router, wait for its serve task, then drain connections
    /// for at most `drain` per router.
    pub async fn shutdown(self, drain: Duration) {
        for router in &self.routers {
            router.close();
        }
        for task in self.tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "Router task panicked");
            }
        }
        for router in &self.routers {
            if !router.drain(drain).await {
                tracing::warn!(
                    node = %router.node(),
                    active = router.active_connections(),
                    "Connections still open after drain timeout"
                );
            }
        }
        tracing::info!(routers = self.routers.len(), "All routers stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::routing::builder::build_router;

    #[tokio::test]
    async fn shutdown_closes_every_router() {
        let chain = Arc::new(Chain::default());
        let routers = vec![
            build_router("socks5://127.0.0.1:0", &chain).await.unwrap(),
            build_router("http://127.0.0.1:0", &chain).await.unwrap(),
        ];
        let running = serve_all(routers);
        assert_eq!(running.len(), 2);
        let addrs: Vec<_> = running
            .routers()
            .iter()
            .map(|r| r.listener().local_addr())
            .collect();

        tokio::time::timeout(Duration::from_secs(2), running.shutdown(Duration::from_millis(100)))
            .await
            .unwrap();

        for addr in addrs {
            assert!(tokio::net::TcpStream::connect(addr).await.is_err());
        }
    }
}
