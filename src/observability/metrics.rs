//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `csi_snapshot_operator_reconcile_total` - Reconcile attempts per controller
//! - `csi_snapshot_operator_reconcile_errors_total` - Failed reconcile attempts per controller
//! - `csi_snapshot_operator_reconcile_duration_seconds` - Reconcile duration per controller
//! - `csi_snapshot_operator_status_conflicts_total` - Optimistic-concurrency conflicts per status object
//! - `csi_snapshot_operator_resource_sets_skipped_total` - Conditional resource sets skipped on indeterminate topology
//! - `csi_snapshot_operator_requeues_total` - Reconciles scheduled again, by controller and reason

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILE_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "csi_snapshot_operator_reconcile_total",
            "Total number of reconcile attempts by controller",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILE_TOTAL metric - this should never happen")
});

static RECONCILE_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "csi_snapshot_operator_reconcile_errors_total",
            "Total number of failed reconcile attempts by controller",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILE_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "csi_snapshot_operator_reconcile_duration_seconds",
            "Duration of reconcile attempts in seconds by controller",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["controller"],
    )
    .expect("Failed to create RECONCILE_DURATION metric - this should never happen")
});

static STATUS_CONFLICTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "csi_snapshot_operator_status_conflicts_total",
            "Total number of optimistic-concurrency conflicts on status writes",
        ),
        &["object"],
    )
    .expect("Failed to create STATUS_CONFLICTS_TOTAL metric - this should never happen")
});

static RESOURCE_SETS_SKIPPED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "csi_snapshot_operator_resource_sets_skipped_total",
            "Total number of conditional resource sets skipped because topology was indeterminate",
        ),
        &["set"],
    )
    .expect("Failed to create RESOURCE_SETS_SKIPPED_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "csi_snapshot_operator_requeues_total",
            "Total number of reconciles scheduled again, by reason",
        ),
        &["controller", "reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILE_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_DURATION.clone()))?;
    REGISTRY.register(Box::new(STATUS_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RESOURCE_SETS_SKIPPED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILE_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_reconciliation_errors(controller: &str) {
    RECONCILE_ERRORS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn observe_reconciliation_duration(controller: &str, duration: f64) {
    RECONCILE_DURATION
        .with_label_values(&[controller])
        .observe(duration);
}

pub fn increment_status_conflicts(object: &str) {
    STATUS_CONFLICTS_TOTAL.with_label_values(&[object]).inc();
}

pub fn increment_resource_sets_skipped(set: &str) {
    RESOURCE_SETS_SKIPPED_TOTAL.with_label_values(&[set]).inc();
}

pub fn increment_requeues(controller: &str, reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[controller, reason]).inc();
}
