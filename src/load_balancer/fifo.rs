//! First-in-first-out selection: always the first surviving node.
//!
//! Combined with the fail filter this gives primary/backup failover.

use std::sync::Arc;

use crate::load_balancer::Strategy;
use crate::node::Node;

#[derive(Debug, Default, Clone, Copy)]
pub struct Fifo;

impl Strategy for Fifo {
    fn apply(&self, nodes: &[Arc<Node>]) -> Option<Arc<Node>> {
        nodes.first().cloned()
    }

    fn name(&self) -> &'static str {
        "fifo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_node;

    #[test]
    fn always_first() {
        let nodes: Vec<_> = ["socks5://a:1", "socks5://b:2"]
            .iter()
            .map(|s| Arc::new(parse_node(s).unwrap()))
            .collect();
        for _ in 0..3 {
            assert_eq!(Fifo.apply(&nodes).unwrap().addr, "a:1");
        }
    }
}
