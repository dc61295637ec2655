//! Name resolution configuration.
//!
//! # Data Flow
//! ```text
//! serve node `dns=` option
//!     → resolver.rs (name servers, timeout/ttl/prefer, reloadable)
//!     → init with the route's chain, timeout, ttl, prefer, source IP
//!
//! serve node `hosts=` option
//!     → hosts.rs (static name → IP map, reloadable)
//!     → consulted before dialing a forward target
//! ```

pub mod hosts;
pub mod resolver;

pub use hosts::{parse_hosts, Hosts};
pub use resolver::{parse_resolver, NameServer, Prefer, Resolver, ResolverOptions};
