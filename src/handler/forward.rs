//! Direct TCP port forwarding.
//!
//! # Data Flow
//! ```text
//! accepted stream
//!     → target group (remote list, standard selector)
//!     → access rules ("tcp", host, port)
//!     → hosts table rewrite
//!     → dial with timeout, up to `attempts` targets
//!     → copy_bidirectional until either side closes
//! ```

use std::time::Duration;

use tokio::net::TcpStream;

use crate::chain::NodeGroup;
use crate::handler::{HandlerError, HandlerOptions};
use crate::load_balancer::{SelectError, Selector};
use crate::net::Accepted;
use crate::node::{join_host_port, split_host_port, Node};
use crate::resilience::timeouts::{io_timeout, or_default, DEFAULT_DIAL_TIMEOUT};
use crate::security::permitted;

/// Group the comma-separated forward targets of a serve node.
pub fn target_group(remote: &str, options: &HandlerOptions) -> NodeGroup {
    let group = NodeGroup::new(0);
    let nodes = remote
        .split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .enumerate()
        .map(|(i, addr)| Node::target(i + 1, addr))
        .collect();
    group.add_nodes(nodes);
    group.set_selector(Selector::standard(
        &options.strategy,
        options.max_fails,
        options.fail_timeout,
    ));
    group
}

/// The address actually dialed for `target`, after the hosts table.
fn dial_addr(options: &HandlerOptions, target: &Node) -> String {
    let (host, port) = target.host_port();
    match options.hosts.as_ref().and_then(|hosts| hosts.lookup(host)) {
        Some(ip) => {
            tracing::debug!(host, %ip, "Resolved from hosts table");
            join_host_port(&ip.to_string(), port)
        }
        None => target.addr.clone(),
    }
}

async fn dial(options: &HandlerOptions, target: &Node, timeout: Duration) -> Result<TcpStream, HandlerError> {
    let (host, port) = split_host_port(&target.addr);
    let port = port.parse().unwrap_or(0);
    if !permitted(
        options.whitelist.as_deref(),
        options.blacklist.as_deref(),
        "tcp",
        host,
        port,
    ) {
        return Err(HandlerError::Denied {
            target: target.addr.clone(),
        });
    }

    let addr = dial_addr(options, target);
    io_timeout(timeout, "dial", TcpStream::connect(&addr))
        .await
        .map_err(|source| HandlerError::Dial {
            target: target.addr.clone(),
            source,
        })
}

/// Forward one accepted connection to the next healthy target.
///
/// A failed dial marks the target and moves on to the next pick; a
/// successful one clears the target's failure history.
pub async fn forward_direct(
    options: &HandlerOptions,
    targets: &NodeGroup,
    conn: Accepted,
) -> Result<(), HandlerError> {
    let Accepted {
        mut stream,
        peer_addr,
        permit: _permit,
    } = conn;
    let timeout = or_default(options.timeout, DEFAULT_DIAL_TIMEOUT);

    let mut last_error = HandlerError::NoTarget(SelectError::NoneAvailable);
    for attempt in 1..=options.attempts() {
        let target = targets.next()?;
        let mut upstream = match dial(options, &target, timeout).await {
            Ok(upstream) => upstream,
            Err(err @ HandlerError::Dial { .. }) => {
                target.marker().mark();
                tracing::debug!(
                    peer = %peer_addr,
                    target = %target.addr,
                    attempt,
                    error = %err,
                    "Forward dial failed"
                );
                last_error = err;
                continue;
            }
            Err(err) => return Err(err),
        };
        target.marker().reset();

        tracing::debug!(peer = %peer_addr, target = %target.addr, "Forwarding");
        let (sent, received) = tokio::io::copy_bidirectional(&mut stream, &mut upstream).await?;
        tracing::debug!(
            peer = %peer_addr,
            target = %target.addr,
            sent,
            received,
            "Forward finished"
        );
        return Ok(());
    }
    Err(last_error)
}
