//! Metrics collection and reporting

use radiolens_core::Provenance;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Failure counter slots; the last one collects unrecognised kinds
const FAILURE_KINDS: [&str; 7] = [
    "decode_error",
    "backend_contract_error",
    "model_load_error",
    "config_error",
    "serialization_error",
    "internal_error",
    "other",
];

const OTHER: usize = FAILURE_KINDS.len() - 1;

/// Metrics collector for Radiolens prediction monitoring
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    real_predictions: AtomicU64,
    fallback_predictions: AtomicU64,
    failures: AtomicU64,
    total_latency_us: AtomicU64,
    failures_by_kind: [AtomicU64; FAILURE_KINDS.len()],
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                real_predictions: AtomicU64::new(0),
                fallback_predictions: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                total_latency_us: AtomicU64::new(0),
                failures_by_kind: Default::default(),
            }),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, provenance: Provenance, latency_us: u64) {
        let counter = match provenance {
            Provenance::Real => &self.inner.real_predictions,
            Provenance::Fallback => &self.inner.fallback_predictions,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.inner
            .total_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);

        metrics::counter!("radiolens_predictions_total", "provenance" => provenance.as_str())
            .increment(1);
        metrics::histogram!("radiolens_prediction_latency_us").record(latency_us as f64);
        trace!(provenance = %provenance, latency_us, "Recorded prediction");
    }

    /// Record a failed prediction by error kind
    pub fn record_failure(&self, kind: &str) {
        self.inner.failures.fetch_add(1, Ordering::Relaxed);

        let slot = FAILURE_KINDS[..OTHER]
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(OTHER);
        self.inner.failures_by_kind[slot].fetch_add(1, Ordering::Relaxed);

        let label = FAILURE_KINDS[slot];

        metrics::counter!("radiolens_failures_total", "kind" => label).increment(1);
        trace!(kind = label, "Recorded failure");
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let failures_by_kind = FAILURE_KINDS
            .iter()
            .zip(&self.inner.failures_by_kind)
            .map(|(kind, count)| (kind.to_string(), count.load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();

        MetricsSnapshot {
            real_predictions: self.inner.real_predictions.load(Ordering::Relaxed),
            fallback_predictions: self.inner.fallback_predictions.load(Ordering::Relaxed),
            failures: self.inner.failures.load(Ordering::Relaxed),
            total_latency_us: self.inner.total_latency_us.load(Ordering::Relaxed),
            failures_by_kind,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub real_predictions: u64,
    pub fallback_predictions: u64,
    pub failures: u64,
    pub total_latency_us: u64,
    pub failures_by_kind: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    /// Successful predictions from either backend
    pub fn total_predictions(&self) -> u64 {
        self.real_predictions + self.fallback_predictions
    }

    /// Calculate average latency per successful prediction
    pub fn avg_latency_us(&self) -> u64 {
        let total = self.total_predictions();
        if total == 0 {
            0
        } else {
            self.total_latency_us / total
        }
    }

    /// Fraction of calls that failed
    pub fn failure_rate(&self) -> f64 {
        let calls = self.total_predictions() + self.failures;
        if calls == 0 {
            0.0
        } else {
            self.failures as f64 / calls as f64
        }
    }

    pub fn failures_of(&self, kind: &str) -> u64 {
        self.failures_by_kind.get(kind).copied().unwrap_or(0)
    }
}

/// Register descriptions for every metric this crate emits
pub fn describe_metrics() {
    metrics::describe_counter!(
        "radiolens_predictions_total",
        "Total number of successful predictions by provenance"
    );
    metrics::describe_counter!(
        "radiolens_failures_total",
        "Total number of failed predictions by error kind"
    );
    metrics::describe_histogram!(
        "radiolens_prediction_latency_us",
        metrics::Unit::Microseconds,
        "Prediction latency in microseconds"
    );
}
