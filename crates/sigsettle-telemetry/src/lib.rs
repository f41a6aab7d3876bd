//! Prometheus metrics and structured logging for sigsettle.
//!
//! - Prometheus metrics for signal lifecycle, price lookups, extraction
//!   and webhook delivery
//! - Structured JSON logging with tracing

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
