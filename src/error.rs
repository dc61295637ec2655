//! Build-time errors.
//!
//! Any of these aborts the whole configuration; no router is started.

use crate::chain::PeerError;
use crate::config::LoaderError;
use crate::net::listener::ListenerError;
use crate::net::tls::TlsError;
use crate::node::NodeError;
use crate::security::PermissionError;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("TLS: {0}")]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("permissions: {0}")]
    Permission(#[from] PermissionError),
    #[error(transparent)]
    Peer(#[from] PeerError),
}
