//! IP expansion lists.

use std::net::Ipv6Addr;

use crate::config::source::{self, LoaderError};
use crate::node::join_host_port;

/// Port used when neither the entry nor the enclosing node has one.
pub const DEFAULT_PORT: &str = "8080";

/// Load the address list named by `arg`, appending `port` (or
/// [`DEFAULT_PORT`]) to entries without one.
pub fn parse_ip(arg: &str, port: &str) -> Result<Vec<String>, LoaderError> {
    let Some(src) = source::open(arg)? else {
        return Ok(Vec::new());
    };
    let port = if port.is_empty() { DEFAULT_PORT } else { port };
    Ok(src
        .entries()
        .into_iter()
        .map(|entry| with_port(entry, port))
        .collect())
}

fn with_port(entry: &str, port: &str) -> String {
    if entry.parse::<Ipv6Addr>().is_ok() {
        return join_host_port(entry, port);
    }
    if let Some(host) = entry.strip_prefix('[').and_then(|e| e.strip_suffix(']')) {
        return join_host_port(host, port);
    }
    if entry.contains(':') {
        entry.to_string()
    } else {
        join_host_port(entry, port)
    }
}
