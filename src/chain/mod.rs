//! Outbound chains.
//!
//! # Data Flow
//! ```text
//! RouteConfig.chain_nodes
//!     → builder.rs (parse, resolve credentials/TLS, build client,
//!                   expand per IP, assign IDs)
//!     → group.rs (NodeGroup: node list + selector, swappable)
//!     → peer.rs (optional PeerConfig appending reloaded peers)
//!     → Chain (ordered groups + retry budget)
//!
//! Per connection:
//!     Chain::select_route() → one node per group, in order
//! ```
//!
//! # Design Decisions
//! - A chain is built once per route and shared by its routers
//! - Groups are the only mutable part, and only through whole-list swaps
//! - An empty chain means direct connection

pub mod builder;
pub mod group;
pub mod peer;

use std::sync::Arc;

use crate::load_balancer::SelectError;
use crate::node::Node;

pub use builder::{build_chain, parse_chain_node};
pub use group::NodeGroup;
pub use peer::{PeerConfig, PeerError, PeerSettings};

/// Ordered node groups plus a retry budget.
#[derive(Debug, Default)]
pub struct Chain {
    groups: Vec<Arc<NodeGroup>>,
    retries: i64,
}

impl Chain {
    pub fn new(retries: i64) -> Self {
        Self {
            groups: Vec::new(),
            retries,
        }
    }

    pub fn add_group(&mut self, group: Arc<NodeGroup>) {
        self.groups.push(group);
    }

    pub fn groups(&self) -> &[Arc<NodeGroup>] {
        &self.groups
    }

    /// An empty chain connects directly.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn retries(&self) -> i64 {
        self.retries
    }

    /// The first node of the last group.
    pub fn last_node(&self) -> Option<Arc<Node>> {
        self.groups.last().and_then(|g| g.nodes().first().cloned())
    }

    /// Pick one node from every group, in traversal order.
    pub fn select_route(&self) -> Result<Vec<Arc<Node>>, SelectError> {
        self.groups.iter().map(|g| g.next()).collect()
    }
}
