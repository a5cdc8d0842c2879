//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): dispatch outcomes by `outcome`
//! - `proxy_errors_total` (counter): transport errors by `code`
//! - `proxy_request_duration_seconds` (histogram): forward latency
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed (tests, embedding)
//! - Prometheus exporter only when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// What the dispatcher did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Out of context, handed to the next handler.
    Passed,
    Proxied,
    Upgraded,
    Failed,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Proxied => "proxied",
            Outcome::Upgraded => "upgraded",
            Outcome::Failed => "failed",
        }
    }
}

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_outcome(mount: &str, outcome: Outcome) {
    counter!(
        "proxy_requests_total",
        "mount" => mount.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_duration(mount: &str, start: Instant) {
    histogram!("proxy_request_duration_seconds", "mount" => mount.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_error(code: &str) {
    counter!("proxy_errors_total", "code" => code.to_string()).increment(1);
}
