//! Radiolens Telemetry
//!
//! Prediction metrics for Radiolens.
//!
//! Provides:
//! - In-process counters for predictions by provenance and failures by kind
//! - Latency accounting
//! - Mirroring of every event through the `metrics` facade

pub mod metrics;

pub use metrics::{describe_metrics, MetricsCollector, MetricsSnapshot};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::metrics::{MetricsCollector, MetricsSnapshot};
}
