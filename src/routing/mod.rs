//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! BaseConfig
//!     → builder.rs (one Router per serve node, chain shared per route)
//!     → router.rs (accept loop → handler task per connection)
//!
//! Destination checks on the forwarding path:
//!     bypass.rs (reloadable matcher set, optionally inverted)
//!     → matcher.rs (IP, CIDR and domain glob matchers)
//! ```
//!
//! # Design Decisions
//! - Building is a pure function of the configuration; the caller owns the
//!   resulting routers
//! - Matchers are stateless; only the bypass rule set reloads

pub mod builder;
pub mod bypass;
pub mod matcher;
pub mod router;

pub use builder::build;
pub use router::Router;
