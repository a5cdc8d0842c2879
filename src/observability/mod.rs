//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatch decisions, rewrites, transport errors
//!     → logging.rs (structured log events, per-mount level gate)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{LogFormat, LogLevel};
