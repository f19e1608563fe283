//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `telemetry_agent_reconciliations_total` - Total number of reconciliation passes
//! - `telemetry_agent_reconciliation_errors_total` - Total number of failed passes
//! - `telemetry_agent_reconciliation_duration_seconds` - Duration of a pass
//! - `telemetry_agent_artifact_actions_total` - Engine outcomes by kind and action
//! - `telemetry_agent_render_failures_total` - Rendering failures by kind
//! - `telemetry_agent_requeues_total` - Requeues by reason

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "telemetry_agent_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "telemetry_agent_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "telemetry_agent_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static ARTIFACT_ACTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "telemetry_agent_artifact_actions_total",
            "Reconcile outcomes per artifact kind and action",
        ),
        &["kind", "action"],
    )
    .expect("Failed to create ARTIFACT_ACTIONS_TOTAL metric - this should never happen")
});

static RENDER_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "telemetry_agent_render_failures_total",
            "Rendering failures caused by invalid TelemetryAgent resources",
        ),
        &["kind"],
    )
    .expect("Failed to create RENDER_FAILURES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "telemetry_agent_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only if a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(ARTIFACT_ACTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RENDER_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_artifact_action(kind: &str, action: &str) {
    ARTIFACT_ACTIONS_TOTAL.with_label_values(&[kind, action]).inc();
}

pub fn increment_render_failures(kind: &str) {
    RENDER_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_action_counter_is_labelled() {
        let before = ARTIFACT_ACTIONS_TOTAL
            .with_label_values(&["metrics", "created"])
            .get();
        increment_artifact_action("metrics", "created");
        assert_eq!(
            ARTIFACT_ACTIONS_TOTAL
                .with_label_values(&["metrics", "created"])
                .get(),
            before + 1
        );
    }
}
