//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! serve node transport
//!     → tcp / default   → listener.rs (TcpListener, bounded by semaphore)
//!     → tls / mtls      → tls_listener.rs (handshake task → channel)
//!     → quic            → quic.rs (quinn endpoint, one stream per conn)
//!     → dns             → dns.rs (udp datagrams, tcp, tls)
//!     → rtcp            → remote.rs (SOCKS5 BIND through the chain)
//!     → Accepted { stream, peer_addr, permit }
//!     → connection.rs (tracking for drain on shutdown)
//! ```
//!
//! # Design Decisions
//! - Every listener exposes the same `Listener` capability set
//! - TLS material lives in tls.rs and is shared by listeners and outbound
//!   hop descriptions

pub mod connection;
pub mod dns;
pub mod listener;
pub mod quic;
pub mod remote;
pub mod socks;
pub mod tls;
pub mod tls_listener;

pub use listener::{Accepted, BoxedStream, Listener, ListenerError, TcpListener};
