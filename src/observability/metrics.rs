//! Metrics collection and exposition.
//!
//! # Metrics
//! - `config_reloads_total` (counter): reload attempts by `outcome`
//! - `handler_swaps_total` (counter): handlers installed after a reload
//! - `http_connections_total` (counter): accepted connections
//! - `http_active_connections` (gauge): connections currently open
//!
//! Recording is a no-op until a recorder is installed, so library code and tests
//! can call these freely.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_reload(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("config_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_handler_swap() {
    metrics::counter!("handler_swaps_total").increment(1);
}

pub fn record_connection_opened() {
    metrics::counter!("http_connections_total").increment(1);
    metrics::gauge!("http_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    metrics::gauge!("http_active_connections").decrement(1.0);
}
