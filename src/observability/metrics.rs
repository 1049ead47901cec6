//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dx_requests_total` (counter): requests by method, status
//! - `dx_request_duration_seconds` (histogram): latency distribution
//! - `dx_static_files_total` (counter): static file outcomes
//! - `dx_pattern_cache_size` (gauge): compiled route patterns held
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op
//! - Labels stay low-cardinality: no paths, no request IDs

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Installs the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> bool {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            tracing::info!(address = %addr, "Metrics endpoint listening");
            true
        }
        Err(err) => {
            tracing::error!(address = %addr, error = %err, "Failed to install metrics exporter");
            false
        }
    }
}

/// Records one completed request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("dx_requests_total", &labels).increment(1);
    histogram!("dx_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

/// Records a static file outcome: `sent`, `not_modified` or `not_found`.
pub fn record_static_file(outcome: &str) {
    counter!("dx_static_files_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_pattern_cache_size(size: usize) {
    gauge!("dx_pattern_cache_size").set(size as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request("GET", 200, Instant::now());
        record_static_file("sent");
        record_pattern_cache_size(3);
    }
}
