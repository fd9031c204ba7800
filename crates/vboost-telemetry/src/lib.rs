//! Prometheus metrics and structured logging for vboost.
//!
//! - Prometheus metrics for round outcomes, phase latencies and volume
//! - Structured logging with tracing (JSON in production)
//! - End-of-run summary

pub mod error;
pub mod logging;
pub mod metrics;
pub mod run_stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use run_stats::{RunStats, RunStatsReporter};
