//! Configuration schema definitions.
//!
//! The outer object is itself a route; further routes live under `Routes`.
//! Keys are PascalCase to match existing deployment files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default, rename_all = "PascalCase")]
pub struct BaseConfig {
    /// The top-level route.
    #[serde(flatten)]
    pub route: RouteConfig,

    /// Additional independent routes.
    pub routes: Vec<RouteConfig>,

    /// Enable debug logging.
    pub debug: bool,
}

impl BaseConfig {
    /// Every route that serves something, the top-level one first.
    pub fn routes(&self) -> impl Iterator<Item = &RouteConfig> {
        std::iter::once(&self.route)
            .chain(self.routes.iter())
            .filter(|route| !route.serve_nodes.is_empty())
    }
}

/// One route: its serve nodes all share the chain built from its chain nodes.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default, rename_all = "PascalCase")]
pub struct RouteConfig {
    /// Inbound node specs.
    pub serve_nodes: Vec<String>,

    /// Outbound hop specs, in traversal order.
    pub chain_nodes: Vec<String>,

    /// Retry budget for the whole chain.
    pub retries: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outer_object_is_a_route() {
        let cfg: BaseConfig = serde_json::from_str(
            r#"{
                "Debug": true,
                "ServeNodes": ["socks5://:1080"],
                "ChainNodes": ["socks5://relay:1080"],
                "Retries": 2,
                "Routes": [{ "ServeNodes": ["http://:8080"] }]
            }"#,
        )
        .unwrap();
        assert!(cfg.debug);
        assert_eq!(cfg.route.serve_nodes, vec!["socks5://:1080"]);
        assert_eq!(cfg.route.retries, 2);
        assert_eq!(cfg.routes.len(), 1);
        assert!(cfg.routes[0].chain_nodes.is_empty());
        assert_eq!(cfg.routes().count(), 2);
    }

    #[test]
    fn empty_top_level_route_is_skipped() {
        let cfg: BaseConfig =
            serde_json::from_str(r#"{ "Routes": [{ "ServeNodes": [":2222"] }] }"#).unwrap();
        let routes: Vec<_> = cfg.routes().collect();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].serve_nodes, vec![":2222"]);
    }
}
