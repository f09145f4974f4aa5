//! # Observability
//!
//! Observability modules for metrics and logging.
//!
//! - `metrics`: Prometheus metrics collection
//! - `logging`: tracing subscriber with a reloadable filter

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{init_logging, LogFilterHandle, LogFormat};
pub use metrics::*;
