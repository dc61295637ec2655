//! Node groups: interchangeable hops at one chain position.

use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use crate::chain::peer::PeerConfig;
use crate::load_balancer::{SelectError, Selector};
use crate::node::Node;

/// A pool of equivalent nodes sharing a selector.
///
/// Readers take a snapshot of the node list per query; writers replace the
/// whole list, so a query never sees a partial update.
#[derive(Debug)]
pub struct NodeGroup {
    pub id: usize,
    nodes: ArcSwap<Vec<Arc<Node>>>,
    selector: ArcSwap<Selector>,
    peer: OnceLock<Arc<PeerConfig>>,
}

impl NodeGroup {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            nodes: ArcSwap::from_pointee(Vec::new()),
            selector: ArcSwap::from_pointee(Selector::default()),
            peer: OnceLock::new(),
        }
    }

    /// Append nodes to the current list.
    pub fn add_nodes(&self, nodes: Vec<Node>) {
        let nodes: Vec<Arc<Node>> = nodes.into_iter().map(Arc::new).collect();
        self.nodes.rcu(|current| {
            let mut next = current.as_ref().clone();
            next.extend(nodes.iter().cloned());
            next
        });
    }

    /// Replace the node list, returning the previous one.
    pub fn set_nodes(&self, nodes: Vec<Arc<Node>>) -> Arc<Vec<Arc<Node>>> {
        self.nodes.swap(Arc::new(nodes))
    }

    /// Snapshot of the current node list.
    pub fn nodes(&self) -> Arc<Vec<Arc<Node>>> {
        self.nodes.load_full()
    }

    pub fn set_selector(&self, selector: Selector) {
        self.selector.store(Arc::new(selector));
    }

    pub fn selector(&self) -> Arc<Selector> {
        self.selector.load_full()
    }

    /// Select a node for one traversal.
    pub fn next(&self) -> Result<Arc<Node>, SelectError> {
        let nodes = self.nodes.load();
        self.selector.load().select(nodes.as_ref().clone())
    }

    /// Give the group ownership of its peer config. Only the first call
    /// takes effect.
    pub fn attach_peer(&self, peer: Arc<PeerConfig>) -> bool {
        self.peer.set(peer).is_ok()
    }

    pub fn peer(&self) -> Option<&Arc<PeerConfig>> {
        self.peer.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_node;
    use std::time::Duration;

    #[test]
    fn add_then_swap() {
        let group = NodeGroup::new(1);
        group.add_nodes(vec![parse_node("socks5://a:1").unwrap()]);
        group.add_nodes(vec![parse_node("socks5://b:2").unwrap()]);
        assert_eq!(group.nodes().len(), 2);

        let snapshot = group.nodes();
        let old = group.set_nodes(vec![Arc::new(parse_node("socks5://c:3").unwrap())]);
        assert_eq!(old.len(), 2);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(group.nodes()[0].addr, "c:3");
    }

    #[test]
    fn selection_marks_are_shared() {
        let group = NodeGroup::new(1);
        group.add_nodes(vec![
            parse_node("socks5://a:1").unwrap(),
            parse_node("socks5://b:2").unwrap(),
        ]);
        group.set_selector(Selector::standard("fifo", 1, Duration::ZERO));

        let first = group.next().unwrap();
        assert_eq!(first.addr, "a:1");
        first.marker().mark();
        assert_eq!(group.next().unwrap().addr, "b:2");
        assert_eq!(group.selector().strategy_name(), "fifo");
    }

    #[test]
    fn empty_group() {
        assert_eq!(NodeGroup::new(1).next(), Err(SelectError::NoneAvailable));
    }
}
