//! Uniform random selection strategy.

use std::sync::Arc;

use crate::load_balancer::Strategy;
use crate::node::Node;

#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl Strategy for Random {
    fn apply(&self, nodes: &[Arc<Node>]) -> Option<Arc<Node>> {
        if nodes.is_empty() {
            return None;
        }
        Some(nodes[fastrand::usize(..nodes.len())].clone())
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_node;

    #[test]
    fn picks_from_the_list() {
        let nodes: Vec<_> = ["socks5://a:1", "socks5://b:2", "socks5://c:3"]
            .iter()
            .map(|s| Arc::new(parse_node(s).unwrap()))
            .collect();
        for _ in 0..50 {
            let picked = Random.apply(&nodes).unwrap();
            assert!(nodes.iter().any(|n| Arc::ptr_eq(n, &picked)));
        }
        assert!(Random.apply(&[]).is_none());
    }
}
