//! Metrics collection and exposition.

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize metrics exporter and server.
pub fn init_metrics(addr: SocketAddr) {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus recorder");

    tracing::info!("Metrics server listening on http://{}", addr);
}

/// Record a connection terminated before reaching an upstream.
pub fn record_connection_rejected(reason: &'static str) {
    counter!("proxy_connections_rejected_total", "reason" => reason).increment(1);
}

/// Record a proxied connection that ran to completion.
pub fn record_connection_complete(upstream: &str) {
    counter!("proxy_connections_total", "upstream" => upstream.to_string()).increment(1);
}

/// Record bytes moved by one byte pump.
pub fn record_bytes_proxied(direction: &'static str, bytes: u64) {
    counter!("proxy_bytes_total", "direction" => direction).increment(bytes);
}
