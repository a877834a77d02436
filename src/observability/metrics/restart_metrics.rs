//! # Restart Metrics
//!
//! Metrics for the sidecar restart rollout. The `phase` label is `platform` or `customer`.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{IntCounterVec, IntGauge};
use std::sync::LazyLock;

static RESTART_RUNS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "istio_operator_sidecar_restart_runs_total",
            "Total number of sidecar restart runs by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create RESTART_RUNS_TOTAL metric - this should never happen")
});

static WORKLOADS_RESTARTED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "istio_operator_workloads_restarted_total",
            "Total number of workloads restarted to pick up a new sidecar",
        ),
        &["phase"],
    )
    .expect("Failed to create WORKLOADS_RESTARTED_TOTAL metric - this should never happen")
});

static WORKLOAD_RESTART_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "istio_operator_workload_restart_failures_total",
            "Total number of workload restarts that failed",
        ),
        &["phase"],
    )
    .expect("Failed to create WORKLOAD_RESTART_FAILURES_TOTAL metric - this should never happen")
});

static FAILED_CUSTOMER_WORKLOADS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "istio_operator_failed_customer_workloads",
        "Customer workloads left on the old sidecar by the last restart run",
    )
    .expect("Failed to create FAILED_CUSTOMER_WORKLOADS metric - this should never happen")
});

/// Register restart metrics with the registry
pub(crate) fn register_restart_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RESTART_RUNS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKLOADS_RESTARTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKLOAD_RESTART_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FAILED_CUSTOMER_WORKLOADS.clone()))?;
    Ok(())
}

pub fn increment_restart_runs(outcome: &str) {
    RESTART_RUNS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_workloads_restarted(phase: &str) {
    WORKLOADS_RESTARTED_TOTAL.with_label_values(&[phase]).inc();
}

pub fn increment_workload_restart_failures(phase: &str) {
    WORKLOAD_RESTART_FAILURES_TOTAL
        .with_label_values(&[phase])
        .inc();
}

pub fn set_failed_customer_workloads(count: usize) {
    FAILED_CUSTOMER_WORKLOADS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_restart_runs() {
        let counter = RESTART_RUNS_TOTAL.with_label_values(&["ready"]);
        let before = counter.get();
        increment_restart_runs("ready");
        assert_eq!(counter.get(), before + 1u64);
    }

    #[test]
    fn test_increment_workloads_restarted() {
        let counter = WORKLOADS_RESTARTED_TOTAL.with_label_values(&["platform"]);
        let before = counter.get();
        increment_workloads_restarted("platform");
        assert_eq!(counter.get(), before + 1u64);
    }

    #[test]
    fn test_increment_workload_restart_failures() {
        let counter = WORKLOAD_RESTART_FAILURES_TOTAL.with_label_values(&["customer"]);
        let before = counter.get();
        increment_workload_restart_failures("customer");
        assert_eq!(counter.get(), before + 1u64);
    }

    #[test]
    fn test_set_failed_customer_workloads() {
        set_failed_customer_workloads(2);
        assert!(FAILED_CUSTOMER_WORKLOADS.get() >= 0);
    }
}
