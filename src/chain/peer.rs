//! Live peer lists appended to a node group.
//!
//! # Formats
//! ```text
//! JSON: { "strategy": "round", "max_fails": 3, "fail_timeout": "30s",
//!         "reload": 60, "nodes": ["socks5://p1:1080"] }
//!
//! Text: strategy round
//!       max_fails 3
//!       fail_timeout 30s
//!       reload 1m
//!       peer socks5://p1:1080
//!       peer socks5://p2:1080
//! ```
//!
//! # Design Decisions
//! - JSON is tried first; anything that is not a JSON object is text
//! - The new node list is built completely before it is swapped in
//! - Base nodes keep their identity (and failure state) across reloads

use std::io::BufRead;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::Deserialize;

use crate::chain::builder::parse_chain_node;
use crate::chain::group::NodeGroup;
use crate::error::BuildError;
use crate::lifecycle::Signal;
use crate::load_balancer::Selector;
use crate::node::options::parse_duration;
use crate::node::Node;
use crate::reload::{split_line, ReloadError, Reloadable};

/// Error type for peer reloads.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("peer {spec:?}: {source}")]
    Node {
        spec: String,
        #[source]
        source: Box<BuildError>,
    },
}

/// The parsed contents of a peer file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSettings {
    pub strategy: String,
    pub max_fails: i64,
    pub fail_timeout: Duration,
    pub period: Duration,
    pub nodes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Seconds(u64),
    Text(String),
}

impl DurationValue {
    fn duration(&self) -> Duration {
        match self {
            DurationValue::Seconds(s) => Duration::from_secs(*s),
            DurationValue::Text(s) => parse_duration(s).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PeerJson {
    strategy: Option<String>,
    max_fails: Option<i64>,
    fail_timeout: Option<DurationValue>,
    reload: Option<DurationValue>,
    nodes: Option<Vec<String>>,
}

impl PeerSettings {
    /// Parse `data` on top of the previous settings.
    ///
    /// JSON overrides only the keys it names. The text form keeps scalar
    /// settings it does not mention but always replaces the peer list.
    pub fn parse(previous: &PeerSettings, data: &str) -> PeerSettings {
        let mut next = previous.clone();

        if let Ok(json) = serde_json::from_str::<PeerJson>(data) {
            if let Some(strategy) = json.strategy {
                next.strategy = strategy;
            }
            if let Some(max_fails) = json.max_fails {
                next.max_fails = max_fails;
            }
            if let Some(fail_timeout) = json.fail_timeout {
                next.fail_timeout = fail_timeout.duration();
            }
            if let Some(reload) = json.reload {
                next.period = reload.duration();
            }
            if let Some(nodes) = json.nodes {
                next.nodes = nodes;
            }
            return next;
        }

        next.nodes.clear();
        for line in data.lines() {
            match split_line(line).as_slice() {
                ["strategy", v, ..] => next.strategy = v.to_string(),
                ["max_fails", v, ..] => next.max_fails = v.parse().unwrap_or(0),
                ["fail_timeout", v, ..] => next.fail_timeout = parse_duration(v).unwrap_or_default(),
                ["reload", v, ..] => next.period = parse_duration(v).unwrap_or_default(),
                ["peer", v, ..] => next.nodes.push(v.to_string()),
                _ => {}
            }
        }
        next
    }
}

/// Reloadable peer list for one node group.
///
/// Holds only a weak reference to its group; the group owns it.
#[derive(Debug)]
pub struct PeerConfig {
    settings: Mutex<PeerSettings>,
    group: Weak<NodeGroup>,
    base_nodes: Vec<Arc<Node>>,
    stop: Signal,
}

impl PeerConfig {
    pub fn new(group: &Arc<NodeGroup>, base_nodes: Vec<Arc<Node>>) -> Self {
        Self {
            settings: Mutex::new(PeerSettings::default()),
            group: Arc::downgrade(group),
            base_nodes,
            stop: Signal::new(),
        }
    }

    pub fn settings(&self) -> PeerSettings {
        self.settings
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn base_nodes(&self) -> &[Arc<Node>] {
        &self.base_nodes
    }

    /// Parse the peer specs into nodes with IDs following the base nodes.
    fn build_nodes(&self, specs: &[String]) -> Result<Vec<Arc<Node>>, PeerError> {
        let mut nodes = self.base_nodes.clone();
        let mut id = self.base_nodes.len() + 1;
        for spec in specs {
            let parsed = parse_chain_node(spec).map_err(|source| PeerError::Node {
                spec: spec.clone(),
                source: Box::new(source),
            })?;
            for mut node in parsed {
                node.id = id;
                id += 1;
                nodes.push(Arc::new(node));
            }
        }
        Ok(nodes)
    }
}

impl Reloadable for PeerConfig {
    fn reload(&self, reader: &mut dyn BufRead) -> Result<(), ReloadError> {
        if self.stopped() {
            return Ok(());
        }
        let mut data = String::new();
        reader.read_to_string(&mut data)?;

        let previous = self.settings();
        let settings = PeerSettings::parse(&previous, &data);
        let nodes = self
            .build_nodes(&settings.nodes)
            .map_err(|e| ReloadError::Parse(e.to_string()))?;

        let Some(group) = self.group.upgrade() else {
            return Ok(());
        };
        group.set_selector(Selector::standard(
            &settings.strategy,
            settings.max_fails,
            settings.fail_timeout,
        ));
        let old = group.set_nodes(nodes);
        for node in old.iter().skip(self.base_nodes.len()) {
            if let Some(bypass) = &node.bypass {
                bypass.stop();
            }
        }

        tracing::debug!(
            group = group.id,
            peers = settings.nodes.len(),
            strategy = %settings.strategy,
            "Peer list reloaded"
        );
        if let Ok(mut current) = self.settings.lock() {
            *current = settings;
        }
        Ok(())
    }

    fn period(&self) -> Option<Duration> {
        if self.stopped() {
            return None;
        }
        Some(self.settings().period)
    }

    fn stop_signal(&self) -> &Signal {
        &self.stop
    }
}
