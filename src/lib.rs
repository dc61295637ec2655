//! tunnel-proxy: route configuration and assembly for a multi-protocol
//! tunnelling proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!   BaseConfig (JSON/TOML, CLI flags)
//!        │
//!        ▼
//!   ┌──────────┐   ChainNodes    ┌──────────────┐
//!   │ routing  │────────────────▶│    chain     │  node groups, selectors,
//!   │ builder  │                 │   builder    │  peer files
//!   └────┬─────┘                 └──────────────┘
//!        │ ServeNodes
//!        ▼
//!   ┌──────────┐   ┌──────────┐   ┌──────────┐
//!   │   net    │──▶│  Router  │──▶│ handler  │──▶ direct forward / protocol engine
//!   │listeners │   │  accept  │   │          │
//!   └──────────┘   └──────────┘   └──────────┘
//!
//!   Cross-cutting: node (spec parsing), config (loaders), security (auth,
//!   access rules), dns (hosts, resolver), reload (file-watched state),
//!   health + load_balancer (selection), observability, resilience, lifecycle
//! ```

// Model and configuration
pub mod config;
pub mod error;
pub mod node;

// Outbound
pub mod chain;
pub mod health;
pub mod load_balancer;

// Inbound
pub mod handler;
pub mod net;
pub mod routing;

// Live state
pub mod dns;
pub mod reload;
pub mod security;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{BaseConfig, RouteConfig};
pub use error::BuildError;
pub use routing::{build, Router};
