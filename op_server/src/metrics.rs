//! Prometheus metrics for the poker service.
//!
//! The exporter is installed on a dedicated scrape endpoint when
//! `METRICS_BIND` is set. The runtime library emits its own series through
//! the `metrics` facade (matchmaking mints); the helpers here cover the
//! transport side.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))
}

/// Record one inbound client command by type tag.
pub fn commands_total(kind: &str) {
    metrics::counter!("poker_commands_total", "kind" => kind.to_string()).increment(1);
}

/// Record a command rejected by the rate limiter.
pub fn commands_rate_limited_total() {
    metrics::counter!("poker_commands_rate_limited_total").increment(1);
}

/// Gauge of currently connected sockets.
pub fn websocket_connections_active(count: usize) {
    metrics::gauge!("poker_websocket_connections_active").set(count as f64);
}

/// Gauge of live tables.
pub fn tables_active(count: usize) {
    metrics::gauge!("poker_tables_active").set(count as f64);
}
