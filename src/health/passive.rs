//! Passive health filtering.
//!
//! # Responsibilities
//! - Exclude nodes that failed too often from selection
//! - Exclude nodes whose address can never be dialed
//!
//! # Design Decisions
//! - Failures are observed by the forwarding path, which marks the node
//! - Filters are stateless; all state lives in the nodes' fail markers
//! - A lone node is never failed out, so a single-hop group stays usable

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::node::Node;

/// Narrows a candidate list before the strategy picks from it.
pub trait Filter: Send + Sync + std::fmt::Debug {
    fn filter(&self, nodes: Vec<Arc<Node>>) -> Vec<Arc<Node>>;
    fn name(&self) -> &'static str;
}

/// Drops nodes with `max_fails` or more failures until `fail_timeout` passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailFilter {
    /// Zero disables the filter.
    pub max_fails: u32,
    /// Zero means a failed node never recovers by time alone.
    pub fail_timeout: Duration,
}

impl FailFilter {
    pub fn new(max_fails: i64, fail_timeout: Duration) -> Self {
        Self {
            max_fails: max_fails.clamp(0, u32::MAX as i64) as u32,
            fail_timeout,
        }
    }

    fn is_available(&self, node: &Node, now: SystemTime) -> bool {
        let marker = node.marker();
        if marker.fail_count() < self.max_fails {
            return true;
        }
        if self.fail_timeout.is_zero() {
            return false;
        }
        match marker.fail_time() {
            Some(at) => now.duration_since(at).unwrap_or_default() >= self.fail_timeout,
            None => true,
        }
    }
}

impl Filter for FailFilter {
    fn filter(&self, nodes: Vec<Arc<Node>>) -> Vec<Arc<Node>> {
        if nodes.len() <= 1 || self.max_fails == 0 {
            return nodes;
        }
        let now = SystemTime::now();
        nodes
            .into_iter()
            .filter(|node| self.is_available(node, now))
            .collect()
    }

    fn name(&self) -> &'static str {
        "fail"
    }
}

/// Drops nodes whose port is not a positive integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvalidFilter;

impl Filter for InvalidFilter {
    fn filter(&self, nodes: Vec<Arc<Node>>) -> Vec<Arc<Node>> {
        nodes
            .into_iter()
            .filter(|node| matches!(node.host_port().1.parse::<u16>(), Ok(port) if port > 0))
            .collect()
    }

    fn name(&self) -> &'static str {
        "invalid"
    }
}
