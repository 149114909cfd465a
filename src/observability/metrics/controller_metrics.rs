//! # Controller Metrics
//!
//! Metrics for reconcile passes: outcomes, duration, requeues, ownership
//! conflicts and immutable-field recreations.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec};
use std::sync::LazyLock;

// Reconciliation metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "installation_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "installation_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "installation_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Requeue metrics
static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "installation_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static OWNERSHIP_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "installation_ownership_conflicts_total",
        "Total number of applies rejected because another installation owns the object",
    )
    .expect("Failed to create OWNERSHIP_CONFLICTS_TOTAL metric - this should never happen")
});

static WORKLOAD_RECREATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "installation_workload_recreations_total",
            "Total number of objects deleted and recreated after an immutable field changed",
        ),
        &["kind"],
    )
    .expect("Failed to create WORKLOAD_RECREATIONS_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OWNERSHIP_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKLOAD_RECREATIONS_TOTAL.clone()))?;
    Ok(())
}

// Public functions for controller metrics

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(reason: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_ownership_conflicts() {
    OWNERSHIP_CONFLICTS_TOTAL.inc();
}

pub fn increment_workload_recreations(kind: &str) {
    WORKLOAD_RECREATIONS_TOTAL.with_label_values(&[kind]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert_eq!(RECONCILIATIONS_TOTAL.get(), before + 1u64);
    }

    #[test]
    fn test_errors_are_labelled_by_reason() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["InvalidSpec"])
            .get();
        increment_reconciliation_errors("InvalidSpec");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["InvalidSpec"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration(1.5);
    }

    #[test]
    fn test_requeues_by_reason() {
        let before = REQUEUES_TOTAL.with_label_values(&["tls_not_ready"]).get();
        increment_requeues_total("tls_not_ready");
        assert_eq!(
            REQUEUES_TOTAL.with_label_values(&["tls_not_ready"]).get(),
            before + 1u64
        );
    }

    #[test]
    fn test_workload_recreations_by_kind() {
        let before = WORKLOAD_RECREATIONS_TOTAL
            .with_label_values(&["Deployment"])
            .get();
        increment_workload_recreations("Deployment");
        assert_eq!(
            WORKLOAD_RECREATIONS_TOTAL
                .with_label_values(&["Deployment"])
                .get(),
            before + 1u64
        );
    }
}
