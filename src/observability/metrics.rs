//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_total` (counter): accepted connections by router
//! - `proxy_active_connections` (gauge): connections being handled
//! - `proxy_handler_errors_total` (counter): failed connections by protocol
//! - `proxy_accept_errors_total` (counter): transient accept failures
//! - `proxy_reloads_total` (counter): file reloads by result

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const CONNECTIONS_TOTAL: &str = "proxy_connections_total";
pub const ACTIVE_CONNECTIONS: &str = "proxy_active_connections";
pub const HANDLER_ERRORS_TOTAL: &str = "proxy_handler_errors_total";
pub const ACCEPT_ERRORS_TOTAL: &str = "proxy_accept_errors_total";
pub const RELOADS_TOTAL: &str = "proxy_reloads_total";

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install prometheus exporter: {}", e))?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

#[inline]
pub fn record_connection_opened(router: &str) {
    counter!(CONNECTIONS_TOTAL, "router" => router.to_string()).increment(1);
    gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

#[inline]
pub fn record_connection_closed() {
    gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}

#[inline]
pub fn record_handler_error(protocol: &'static str) {
    counter!(HANDLER_ERRORS_TOTAL, "protocol" => protocol).increment(1);
}

#[inline]
pub fn record_accept_error() {
    counter!(ACCEPT_ERRORS_TOTAL).increment(1);
}

#[inline]
pub fn record_reload(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    counter!(RELOADS_TOTAL, "result" => result).increment(1);
}
