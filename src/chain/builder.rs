//! Chain construction from route configuration.

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;

use crate::chain::group::NodeGroup;
use crate::chain::peer::PeerConfig;
use crate::chain::Chain;
use crate::config::ip::parse_ip;
use crate::config::users::parse_users;
use crate::config::{LoaderError, RouteConfig};
use crate::error::BuildError;
use crate::load_balancer::Selector;
use crate::net::tls::{load_ca, ClientTlsConfig};
use crate::node::{
    parse_node, Client, ConnectOptions, Connector, Credential, DialOptions, HandshakeOptions, Node,
    NodeError, QuicConfig, Transport, Transporter,
};
use crate::reload::{self, Reloadable};
use crate::routing::bypass::parse_bypass;

/// SNI used when a hop address has no host part.
pub const DEFAULT_SERVER_NAME: &str = "localhost";

/// Credential from the base64 `auth` option, when the node has none.
pub(crate) fn decode_auth(node: &Node) -> Result<Option<Credential>, NodeError> {
    if node.user.is_some() {
        return Ok(node.user.clone());
    }
    let auth = node.get("auth");
    if auth.is_empty() {
        return Ok(None);
    }
    let raw = base64::engine::general_purpose::STANDARD.decode(auth)?;
    Ok(Some(Credential::from_pair(&String::from_utf8_lossy(&raw))))
}

/// Parse one chain node spec into its sibling nodes, one per expanded IP.
///
/// Credential order: userinfo, `auth`, first `secrets` entry.
pub fn parse_chain_node(spec: &str) -> Result<Vec<Node>, BuildError> {
    let mut node = parse_node(spec)?;
    let opts = node.node_options();

    node.user = decode_auth(&node)?;
    if node.user.is_none() {
        node.user = parse_users(&opts.secrets)?.into_iter().next();
    }

    let (host, port) = node.host_port();
    let server_name = if host.is_empty() { DEFAULT_SERVER_NAME } else { host }.to_string();
    let port = port.to_string();
    let tls = ClientTlsConfig {
        server_name,
        insecure_skip_verify: !opts.secure,
        ca: opts.ca.clone(),
        root_cas: load_ca(&opts.ca)?,
    };

    let transporter = Transporter::for_transport(
        node.transport,
        || QuicConfig::new(opts.keepalive, opts.timeout, opts.idle, &opts.cipher),
        &opts.host,
    );
    let connector = Connector::for_protocol(node.protocol, node.user.clone(), &opts.host);
    node.client = Some(Client {
        connector,
        transporter,
    });

    node.dial_options = DialOptions {
        timeout: opts.timeout,
    };
    node.connect_options = ConnectOptions {
        user_agent: opts.agent.clone(),
        no_tls: opts.notls,
    };

    let handshake_host = if node.transport == Transport::Ohttp && !opts.host.is_empty() {
        opts.host.clone()
    } else {
        node.host.clone()
    };
    let handshake = HandshakeOptions {
        addr: node.addr.clone(),
        host: handshake_host,
        user: node.user.clone(),
        tls,
        interval: opts.ping,
        timeout: opts.timeout,
        retry: opts.retry,
    };

    node.bypass = parse_bypass(&opts.bypass)?;

    let ips = parse_ip(&opts.ip, &port)?;
    if ips.is_empty() {
        node.handshake_options = Some(handshake);
        return Ok(vec![node]);
    }

    Ok(ips
        .into_iter()
        .map(|ip| {
            let mut sibling = node.clone();
            sibling.handshake_options = Some(HandshakeOptions {
                addr: ip.clone(),
                ..handshake.clone()
            });
            sibling.addr = ip;
            sibling
        })
        .collect())
}

/// Build the chain for one route.
///
/// Each chain node spec becomes one group. The group's first node supplies
/// its strategy and fail filter; a `peer` option attaches a live peer list.
pub fn build_chain(route: &RouteConfig) -> Result<Chain, BuildError> {
    let mut chain = Chain::new(route.retries);

    for (i, spec) in route.chain_nodes.iter().enumerate() {
        let mut nodes = parse_chain_node(spec)?;
        for (n, node) in nodes.iter_mut().enumerate() {
            node.id = n + 1;
        }
        let opts = nodes[0].node_options();

        let group = Arc::new(NodeGroup::new(i + 1));
        group.add_nodes(nodes);
        group.set_selector(Selector::standard(&opts.strategy, opts.max_fails, opts.fail_timeout));

        if !opts.peer.is_empty() {
            attach_peer(&group, &opts.peer)?;
        }

        tracing::debug!(
            group = group.id,
            nodes = group.nodes().len(),
            strategy = group.selector().strategy_name(),
            "Chain group built"
        );
        chain.add_group(group);
    }

    Ok(chain)
}

fn attach_peer(group: &Arc<NodeGroup>, path: &str) -> Result<(), BuildError> {
    let path = PathBuf::from(path);
    let contents = std::fs::read_to_string(&path).map_err(|source| LoaderError::Io {
        path: path.clone(),
        source,
    })?;

    let peer = Arc::new(PeerConfig::new(group, group.nodes().as_ref().clone()));
    peer.reload(&mut contents.as_bytes())
        .map_err(|e| LoaderError::parse("peer config", e.to_string()))?;
    group.attach_peer(peer.clone());
    reload::spawn(&peer, path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn single_node_handshake_addr() {
        let nodes = parse_chain_node("socks5://relay:1080").unwrap();
        assert_eq!(nodes.len(), 1);
        let hs = nodes[0].handshake_options.as_ref().unwrap();
        assert_eq!(hs.addr, nodes[0].addr);
        assert_eq!(hs.tls.server_name, "relay");
        assert!(hs.tls.insecure_skip_verify);
    }

    #[test]
    fn ip_expansion() {
        let nodes = parse_chain_node("socks5://relay:1080?ip=10.0.0.1,10.0.0.2:1081").unwrap();
        let addrs: Vec<&str> = nodes.iter().map(|n| n.addr.as_str()).collect();
        assert_eq!(addrs, vec!["10.0.0.1:1080", "10.0.0.2:1081"]);
        for node in &nodes {
            assert_eq!(node.handshake_options.as_ref().unwrap().addr, node.addr);
        }
        nodes[0].marker().mark();
        assert_eq!(nodes[1].marker().fail_count(), 0);
    }

    #[test]
    fn empty_host_uses_localhost_sni() {
        let nodes = parse_chain_node("socks5+tls://:1080?secure=true").unwrap();
        let tls = &nodes[0].handshake_options.as_ref().unwrap().tls;
        assert_eq!(tls.server_name, DEFAULT_SERVER_NAME);
        assert!(!tls.insecure_skip_verify);
    }

    #[test]
    fn credential_sources() {
        let from_auth = parse_chain_node("http://relay:8080?auth=dXNlcjpwYXNz").unwrap();
        assert_eq!(from_auth[0].user, Some(Credential::new("user", Some("pass".into()))));

        let userinfo_wins = parse_chain_node("http://me:pw@relay:8080?auth=dXNlcjpwYXNz").unwrap();
        assert_eq!(userinfo_wins[0].user.as_ref().unwrap().username, "me");

        let mut secrets = tempfile::NamedTempFile::new().unwrap();
        writeln!(secrets, "# users\nfirst one\nsecond two").unwrap();
        let spec = format!("socks5://relay:1080?secrets={}", secrets.path().display());
        let from_secrets = parse_chain_node(&spec).unwrap();
        assert_eq!(from_secrets[0].user, Some(Credential::new("first", Some("one".into()))));
        assert!(matches!(
            from_secrets[0].client.as_ref().unwrap().connector,
            Connector::Socks5 { user: Some(_) }
        ));

        assert!(matches!(
            parse_chain_node("http://relay:8080?auth=***"),
            Err(BuildError::Node(NodeError::BadAuth(_)))
        ));
    }

    #[test]
    fn quic_key() {
        let nodes = parse_chain_node("socks5+quic://relay:443?cipher=secret&keepalive=true&idle=30s").unwrap();
        let Transporter::Quic(quic) = &nodes[0].client.as_ref().unwrap().transporter else {
            panic!("expected QUIC transporter");
        };
        assert_eq!(quic.key, crate::node::client::derive_key("secret"));
        assert!(quic.keep_alive);
        assert_eq!(quic.idle_timeout, std::time::Duration::from_secs(30));

        let nodes = parse_chain_node("socks5+quic://relay:443").unwrap();
        let Transporter::Quic(quic) = &nodes[0].client.as_ref().unwrap().transporter else {
            panic!("expected QUIC transporter");
        };
        assert!(quic.key.is_none());
    }

    #[test]
    fn options_reach_client() {
        let nodes = parse_chain_node("http+ohttp://relay:80?host=cdn.example&agent=curl&notls=1&timeout=5s&ping=30s&retry=2").unwrap();
        let node = &nodes[0];
        assert_eq!(
            node.client.as_ref().unwrap().transporter,
            Transporter::ObfsHttp { host: "cdn.example".into() }
        );
        assert_eq!(node.connect_options.user_agent, "curl");
        assert!(node.connect_options.no_tls);
        assert_eq!(node.dial_options.timeout, std::time::Duration::from_secs(5));
        let hs = node.handshake_options.as_ref().unwrap();
        assert_eq!(hs.host, "cdn.example");
        assert_eq!(hs.retry, 2);
        assert_eq!(hs.interval, std::time::Duration::from_secs(30));
    }

    #[test]
    fn chain_groups_and_ids() {
        let route = RouteConfig {
            chain_nodes: vec![
                "socks5://relay:1080?ip=10.0.0.1,10.0.0.2:1081&strategy=random&max_fails=2".into(),
                "http://exit:8080".into(),
            ],
            retries: 2,
            ..Default::default()
        };
        let chain = build_chain(&route).unwrap();
        assert_eq!(chain.groups().len(), 2);
        assert_eq!(chain.retries(), 2);

        let first = &chain.groups()[0];
        assert_eq!(first.id, 1);
        let ids: Vec<usize> = first.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(first.selector().strategy_name(), "random");
        assert_eq!(chain.groups()[1].id, 2);
        assert_eq!(chain.groups()[1].selector().strategy_name(), "round");
    }

    #[tokio::test]
    async fn peer_file_extends_group() {
        let mut peers = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            peers,
            "strategy round\nmax_fails 3\nfail_timeout 30s\npeer socks5://p1:1080\npeer socks5://p2:1080"
        )
        .unwrap();
        let route = RouteConfig {
            chain_nodes: vec![format!("socks5://base:1080?peer={}", peers.path().display())],
            ..Default::default()
        };
        let chain = build_chain(&route).unwrap();
        let group = &chain.groups()[0];
        let ids: Vec<usize> = group.nodes().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(group.selector().strategy_name(), "round");
        assert!(group.peer().is_some());
    }

    #[test]
    fn missing_peer_file_is_an_error() {
        let route = RouteConfig {
            chain_nodes: vec!["socks5://base:1080?peer=/nonexistent/peers.txt".into()],
            ..Default::default()
        };
        assert!(matches!(build_chain(&route), Err(BuildError::Loader(LoaderError::Io { .. }))));
    }
}
