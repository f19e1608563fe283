//! # Reconciler
//!
//! Glue between `kube_runtime::Controller` and the [`ReconcileEngine`].
//!
//! One pass for a TelemetryAgent:
//!
//! 1. Skip if `spec.suspend` is set (status phase `Suspended`).
//! 2. Build the [`DesiredState`].
//! 3. Run the engine for every [`ArtifactKind`] with a child of the process
//!    shutdown token. A failure for one kind does not stop the other.
//! 4. Patch the status and requeue after the reconcile interval, or hand the
//!    first failure to the error policy.

use crate::config::ControllerConfig;
use crate::constants::FIELD_MANAGER;
use crate::controller::artifact::{
    artifact_name, ArtifactKind, DesiredState, DesiredStateError,
};
use crate::controller::backoff::BackoffRegistry;
use crate::controller::engine::{ReconcileEngine, ReconcileError};
use crate::controller::render::{KubeSecretResolver, RenderError};
use crate::controller::store::KubeSecretStore;
use crate::crd::{ArtifactStatus, Condition, TelemetryAgent, TelemetryAgentStatus};
use crate::observability::metrics;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

pub const PHASE_READY: &str = "Ready";
pub const PHASE_FAILED: &str = "Failed";
pub const PHASE_SUSPENDED: &str = "Suspended";

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("invalid TelemetryAgent: {0}")]
    InvalidResource(#[from] DesiredStateError),
    #[error("{kind} artifact: {source}")]
    Artifact {
        kind: ArtifactKind,
        #[source]
        source: ReconcileError,
    },
    #[error("failed to update status: {0}")]
    Status(#[source] kube::Error),
    /// The resource was deleted while the pass was running
    #[error("TelemetryAgent no longer exists")]
    AgentGone,
}

impl ReconcilerError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcilerError::InvalidResource(_) | ReconcilerError::AgentGone => false,
            ReconcilerError::Artifact { source, .. } => source.is_retryable(),
            ReconcilerError::Status(_) => true,
        }
    }
}

/// Shared context for every reconcile pass
pub struct Reconciler {
    pub client: Client,
    pub config: ControllerConfig,
    pub backoff: BackoffRegistry,
    /// Cancelled on SIGINT/SIGTERM; each pass runs on a child token
    pub shutdown: CancellationToken,
    engine: ReconcileEngine<KubeSecretStore, KubeSecretResolver>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(client: Client, config: ControllerConfig, shutdown: CancellationToken) -> Self {
        let engine = ReconcileEngine::new(
            KubeSecretStore::new(client.clone()),
            KubeSecretResolver::new(client.clone()),
        )
        .with_labels(config.artifact_labels.clone());

        Self {
            backoff: BackoffRegistry::new(config.backoff_min_minutes, config.backoff_max_minutes),
            client,
            config,
            shutdown,
            engine,
        }
    }
}

/// `namespace/name` key used for per-resource bookkeeping
#[must_use]
pub fn resource_key(agent: &TelemetryAgent) -> String {
    agent_key(agent.namespace().as_deref(), &agent.name_any())
}

#[must_use]
pub fn agent_key(namespace: Option<&str>, name: &str) -> String {
    format!("{}/{}", namespace.unwrap_or_default(), name)
}

/// Reconcile one TelemetryAgent
pub async fn reconcile(
    agent: Arc<TelemetryAgent>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = agent.name_any();
    let namespace = agent.namespace().unwrap_or_default();
    let span = info_span!(
        "reconcile",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        resource.generation = agent.metadata.generation.unwrap_or(0),
    );

    async move {
        metrics::increment_reconciliations();
        let start = Instant::now();
        let result = run_pass(&agent, &ctx).await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        settle_backoff(&ctx.backoff, &resource_key(&agent), result)
    }
    .instrument(span)
    .await
}

/// Update backoff bookkeeping for a finished pass
///
/// A pass that finds its agent deleted drops the backoff entry and stops
/// requeueing instead of reporting a failure.
fn settle_backoff(
    backoff: &BackoffRegistry,
    key: &str,
    result: Result<Action, ReconcilerError>,
) -> Result<Action, ReconcilerError> {
    match result {
        Ok(action) => {
            if backoff.record_success(key) {
                info!("Recovered after earlier failures, backoff reset");
            }
            Ok(action)
        }
        Err(ReconcilerError::AgentGone) => {
            backoff.forget(key);
            debug!("TelemetryAgent was deleted during reconciliation, nothing left to do");
            Ok(Action::await_change())
        }
        Err(e) => Err(e),
    }
}

async fn run_pass(agent: &TelemetryAgent, ctx: &Reconciler) -> Result<Action, ReconcilerError> {
    let api: Api<TelemetryAgent> = Api::namespaced(
        ctx.client.clone(),
        &agent.namespace().unwrap_or_default(),
    );

    if agent.spec.suspend {
        debug!("Skipping reconciliation - resource is suspended");
        let status = suspended_status(agent.status.as_ref(), agent.metadata.generation);
        patch_status(&api, agent, status).await?;
        return Ok(Action::await_change());
    }

    let desired = DesiredState::from_agent(agent)?;
    let cancel = ctx.shutdown.child_token();

    let mut artifacts = Vec::new();
    let mut failure: Option<ReconcilerError> = None;
    for kind in ArtifactKind::ALL {
        let secret_name = artifact_name(&desired.owner.name, kind);
        let action = match ctx.engine.reconcile(&desired, kind, &cancel).await {
            Ok(outcome) => outcome.as_str(),
            Err(e) => {
                report_diagnostics(&e);
                warn!(kind = %kind, error = %e, retryable = e.is_retryable(), "Artifact reconcile failed");
                let cancelled = matches!(e, ReconcileError::Cancelled { .. });
                if failure.is_none() {
                    failure = Some(ReconcilerError::Artifact { kind, source: e });
                }
                if cancelled {
                    break;
                }
                "Failed"
            }
        };
        artifacts.push(ArtifactStatus {
            kind: kind.as_str().to_string(),
            secret_name,
            action: action.to_string(),
        });
    }

    let outcome = failure.as_ref().map(|e| (failure_reason(e), e.to_string()));
    let status = pass_status(
        agent.status.as_ref(),
        agent.metadata.generation,
        artifacts,
        outcome,
    );
    if !ctx.shutdown.is_cancelled() {
        patch_status(&api, agent, status).await?;
    }

    match failure {
        Some(e) => Err(e),
        None => {
            metrics::increment_requeues_total("periodic");
            Ok(Action::requeue(ctx.config.reconcile_interval()))
        }
    }
}

/// Write rendering diagnostics verbatim so line breaks survive log encoders
fn report_diagnostics(error: &ReconcileError) {
    if let ReconcileError::Render(render) = error {
        if let Some(diagnostics) = render.diagnostics() {
            eprintln!("{diagnostics}");
        }
    }
}

fn failure_reason(error: &ReconcilerError) -> &'static str {
    match error {
        ReconcilerError::Artifact {
            source: ReconcileError::Render(RenderError::RenderingFailed { .. }),
            ..
        } => "RenderingFailed",
        ReconcilerError::Artifact {
            source: ReconcileError::Render(RenderError::SecretResolutionFailed { .. }),
            ..
        } => "SecretResolutionFailed",
        ReconcilerError::Artifact {
            source: ReconcileError::Cancelled { .. },
            ..
        } => "Cancelled",
        ReconcilerError::InvalidResource(_) => "InvalidResource",
        _ => "ReconcileFailed",
    }
}

/// Status after a full pass; `failure` is `(reason, message)` of the first error
#[must_use]
pub fn pass_status(
    previous: Option<&TelemetryAgentStatus>,
    generation: Option<i64>,
    artifacts: Vec<ArtifactStatus>,
    failure: Option<(&str, String)>,
) -> TelemetryAgentStatus {
    let (phase, condition) = match failure {
        None => (
            PHASE_READY,
            ready_condition(previous, "True", "Reconciled", "Configuration artifacts are up to date"),
        ),
        Some((reason, message)) => (PHASE_FAILED, ready_condition(previous, "False", reason, &message)),
    };
    TelemetryAgentStatus {
        phase: Some(phase.to_string()),
        conditions: vec![condition],
        observed_generation: generation,
        last_reconcile_time: Some(chrono::Utc::now().to_rfc3339()),
        artifacts,
    }
}

/// Status for a suspended agent; artifacts from the last pass are kept
#[must_use]
pub fn suspended_status(
    previous: Option<&TelemetryAgentStatus>,
    generation: Option<i64>,
) -> TelemetryAgentStatus {
    TelemetryAgentStatus {
        phase: Some(PHASE_SUSPENDED.to_string()),
        conditions: vec![ready_condition(
            previous,
            "False",
            "Suspended",
            "Reconciliation is suspended",
        )],
        observed_generation: generation,
        last_reconcile_time: previous.and_then(|s| s.last_reconcile_time.clone()),
        artifacts: previous.map(|s| s.artifacts.clone()).unwrap_or_default(),
    }
}

/// Ready condition that keeps its transition time while the status holds
fn ready_condition(
    previous: Option<&TelemetryAgentStatus>,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    let last_transition_time = previous
        .and_then(|s| s.conditions.iter().find(|c| c.r#type == "Ready"))
        .filter(|c| c.status == status)
        .and_then(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    Condition {
        r#type: "Ready".to_string(),
        status: status.to_string(),
        last_transition_time: Some(last_transition_time),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    }
}

/// Whether `new` says anything `old` doesn't, ignoring the reconcile timestamp
///
/// Status writes trigger a watch event, so writing only on change keeps the
/// controller from re-queueing itself forever.
#[must_use]
pub fn status_changed(old: Option<&TelemetryAgentStatus>, new: &TelemetryAgentStatus) -> bool {
    match old {
        None => true,
        Some(old) => {
            let mut old = old.clone();
            old.last_reconcile_time.clone_from(&new.last_reconcile_time);
            old != *new
        }
    }
}

async fn patch_status(
    api: &Api<TelemetryAgent>,
    agent: &TelemetryAgent,
    status: TelemetryAgentStatus,
) -> Result<(), ReconcilerError> {
    if !status_changed(agent.status.as_ref(), &status) {
        debug!("Status unchanged, skipping patch");
        return Ok(());
    }

    let patch = serde_json::json!({ "status": status });
    match api
        .patch_status(
            &agent.name_any(),
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(patch),
        )
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => Err(ReconcilerError::AgentGone),
        Err(e) => Err(ReconcilerError::Status(e)),
    }
}
