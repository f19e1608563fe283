//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.

use crate::controller::reconciler::{resource_key, Reconciler, ReconcilerError};
use crate::crd::TelemetryAgent;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource to avoid cross-resource interference.
/// Non-retryable failures are retried on the same schedule: an undefined
/// secret reference is fixed by creating a Secret, which does not touch the
/// TelemetryAgent and so would never trigger a new pass on its own.
pub fn handle_reconciliation_error(
    obj: Arc<TelemetryAgent>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let key = resource_key(&obj);

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource = key.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    error!(retryable = error.is_retryable(), "Reconciliation error for {}: {}", key, error);
    observability::metrics::increment_reconciliation_errors();

    let (delay, error_count) = ctx.backoff.record_failure(&key);
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::minutes(1));

    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {}, next attempt at {})",
        delay.as_secs(),
        error_count,
        next_trigger_time.to_rfc3339()
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}
