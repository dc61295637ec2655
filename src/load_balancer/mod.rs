//! Node selection subsystem.
//!
//! # Data Flow
//! ```text
//! NodeGroup::next()
//!     → snapshot of the group's node list
//!     → Selector:
//!         - health filters (fail counts, invalid addresses)
//!         - strategy:
//!             - round_robin.rs (rotate through nodes)
//!             - random.rs (uniform pick)
//!             - fifo.rs (always the first survivor)
//!     → Return the chosen node or NoneAvailable
//! ```
//!
//! # Design Decisions
//! - Strategies keep only their own counters; node state lives in the nodes
//! - Selection is per group, configured by the group's first node
//! - Unknown strategy names fall back to round-robin

pub mod fifo;
pub mod random;
pub mod round_robin;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::health::{FailFilter, Filter, InvalidFilter};
use crate::node::Node;

pub use fifo::Fifo;
pub use random::Random;
pub use round_robin::RoundRobin;

/// Picks one node out of a non-empty candidate list.
pub trait Strategy: Send + Sync + fmt::Debug {
    fn apply(&self, nodes: &[Arc<Node>]) -> Option<Arc<Node>>;
    fn name(&self) -> &'static str;
}

/// Build a strategy by name.
pub fn new_strategy(name: &str) -> Box<dyn Strategy> {
    match name {
        "random" => Box::new(Random),
        "fifo" => Box::new(Fifo),
        _ => Box::new(RoundRobin::new()),
    }
}

/// Error returned when no node survives filtering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("no node available")]
    NoneAvailable,
}

/// Filters followed by a strategy.
#[derive(Debug)]
pub struct Selector {
    filters: Vec<Box<dyn Filter>>,
    strategy: Box<dyn Strategy>,
}

impl Selector {
    pub fn new(strategy: Box<dyn Strategy>, filters: Vec<Box<dyn Filter>>) -> Self {
        Self { filters, strategy }
    }

    /// The standard group selector: fail filter, invalid filter, named strategy.
    pub fn standard(strategy: &str, max_fails: i64, fail_timeout: Duration) -> Self {
        Self::new(
            new_strategy(strategy),
            vec![
                Box::new(FailFilter::new(max_fails, fail_timeout)),
                Box::new(InvalidFilter),
            ],
        )
    }

    pub fn select(&self, nodes: Vec<Arc<Node>>) -> Result<Arc<Node>, SelectError> {
        let mut nodes = nodes;
        for filter in &self.filters {
            nodes = filter.filter(nodes);
        }
        if nodes.is_empty() {
            return Err(SelectError::NoneAvailable);
        }
        self.strategy.apply(&nodes).ok_or(SelectError::NoneAvailable)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn filters(&self) -> &[Box<dyn Filter>] {
        &self.filters
    }
}

impl Default for Selector {
    /// Round-robin with no filters.
    fn default() -> Self {
        Self::new(Box::new(RoundRobin::new()), Vec::new())
    }
}
