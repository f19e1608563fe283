//! # Reconcile Engine
//!
//! Converges the artifact Secret of one (owner, kind) pair:
//!
//! ```text
//! Start -> desire computed -> { nothing to do | create | update | delete } -> Done | Failed
//! ```
//!
//! Everything before the final store call (key resolution, rendering, the
//! ownership check) is free of side effects. A failed render returns before
//! the store is touched, so the last good artifact stays in place.
//!
//! Cancellation is honoured while reading and rendering, and checked once
//! more right before a mutation is issued. A mutation that has been issued
//! runs to completion.

use crate::controller::artifact::{
    ownership, resolve_key, ArtifactKey, ArtifactKind, DesiredState, PersistedObject,
};
use crate::controller::render::{self, RenderError, SecretResolver};
use crate::controller::store::{ArtifactStore, StoreError};
use crate::observability::metrics;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// What a successful pass did (or found)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing desired, nothing there
    Absent,
    /// Nothing desired, but an object we don't manage holds the name
    Foreign,
    Deleted,
    Created,
    Updated,
    /// Existing object already matched
    Unchanged,
}

impl ReconcileOutcome {
    /// Action name used in status and metrics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Absent => "Absent",
            ReconcileOutcome::Foreign => "Foreign",
            ReconcileOutcome::Deleted => "Deleted",
            ReconcileOutcome::Created => "Created",
            ReconcileOutcome::Updated => "Updated",
            ReconcileOutcome::Unchanged => "Unchanged",
        }
    }

    /// Whether the store was written to
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Deleted | ReconcileOutcome::Created | ReconcileOutcome::Updated
        )
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to read {key}: {source}")]
    Fetch {
        key: ArtifactKey,
        #[source]
        source: StoreError,
    },
    #[error("failed to delete {key}: {source}")]
    Delete {
        key: ArtifactKey,
        #[source]
        source: StoreError,
    },
    #[error("failed to write {key}: {source}")]
    Upsert {
        key: ArtifactKey,
        #[source]
        source: StoreError,
    },
    #[error("reconcile of {key} cancelled before any change was made")]
    Cancelled { key: ArtifactKey },
}

impl ReconcileError {
    /// False when only a change to the resource itself can fix the failure
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ReconcileError::Render(
                RenderError::UnsupportedArtifactKind(_) | RenderError::RenderingFailed { .. }
            )
        )
    }
}

/// Single-resource convergence over a store and a secret resolver
pub struct ReconcileEngine<S, R> {
    store: S,
    resolver: R,
    extra_labels: BTreeMap<String, String>,
}

impl<S, R> std::fmt::Debug for ReconcileEngine<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileEngine")
            .field("extra_labels", &self.extra_labels)
            .finish_non_exhaustive()
    }
}

impl<S, R> ReconcileEngine<S, R>
where
    S: ArtifactStore,
    R: SecretResolver,
{
    pub fn new(store: S, resolver: R) -> Self {
        Self {
            store,
            resolver,
            extra_labels: BTreeMap::new(),
        }
    }

    /// Labels stamped on every artifact in addition to our own
    #[must_use]
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.extra_labels = labels;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Converge the artifact of `kind` for `desired`
    pub async fn reconcile(
        &self,
        desired: &DesiredState,
        kind: ArtifactKind,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let key = resolve_key(&desired.owner.namespace, &desired.owner.name, kind);
        let span = info_span!(
            "reconcile_artifact",
            owner = %format!("{}/{}", desired.owner.namespace, desired.owner.name),
            kind = %kind,
            secret = %key,
        );

        async move {
            let current = self.fetch(&key, cancel).await?;

            let outcome = if desired.should_exist(kind) {
                self.converge_present(desired, kind, &key, current, cancel)
                    .await?
            } else {
                self.converge_absent(&key, current, cancel).await?
            };

            metrics::increment_artifact_action(kind.as_str(), outcome.as_str());
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    async fn fetch(
        &self,
        key: &ArtifactKey,
        cancel: &CancellationToken,
    ) -> Result<Option<PersistedObject>, ReconcileError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ReconcileError::Cancelled { key: key.clone() }),
            result = self.store.get(key) => result.map_err(|source| ReconcileError::Fetch {
                key: key.clone(),
                source,
            }),
        }
    }

    async fn converge_absent(
        &self,
        key: &ArtifactKey,
        current: Option<PersistedObject>,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        match current {
            None => {
                debug!("No instances configured and no artifact present");
                Ok(ReconcileOutcome::Absent)
            }
            Some(existing) if !ownership::is_managed(&existing) => {
                info!("Secret exists but is not managed by this operator, leaving it alone");
                Ok(ReconcileOutcome::Foreign)
            }
            Some(existing) => {
                ensure_not_cancelled(key, cancel)?;
                self.store
                    .delete(&existing)
                    .await
                    .map_err(|source| ReconcileError::Delete {
                        key: key.clone(),
                        source,
                    })?;
                info!("Deleted artifact, no instances configured");
                Ok(ReconcileOutcome::Deleted)
            }
        }
    }

    async fn converge_present(
        &self,
        desired: &DesiredState,
        kind: ArtifactKind,
        key: &ArtifactKey,
        current: Option<PersistedObject>,
        cancel: &CancellationToken,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let rendered = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ReconcileError::Cancelled { key: key.clone() }),
            result = render::render(desired, kind, &self.resolver) => result,
        };
        let rendered = rendered.inspect_err(|e| {
            if let Some(diagnostics) = e.diagnostics() {
                metrics::increment_render_failures(kind.as_str());
                warn!(
                    problems = diagnostics.entries.len(),
                    "Rendering failed, existing artifact left untouched"
                );
            }
        })?;

        let wanted = PersistedObject::for_artifact(
            key.clone(),
            &desired.owner,
            &rendered,
            &self.extra_labels,
        );

        match current {
            None => {
                ensure_not_cancelled(key, cancel)?;
                self.store
                    .create(&wanted)
                    .await
                    .map_err(|source| ReconcileError::Upsert {
                        key: key.clone(),
                        source,
                    })?;
                info!(bytes = rendered.content.len(), "Created artifact");
                Ok(ReconcileOutcome::Created)
            }
            Some(existing) => {
                if !ownership::is_managed(&existing) {
                    warn!("Adopting secret that lacks the managed-by label");
                }

                let merged = wanted.merged_onto(&existing);
                if merged.has_same_content(&existing) {
                    debug!("Artifact is up to date");
                    return Ok(ReconcileOutcome::Unchanged);
                }

                ensure_not_cancelled(key, cancel)?;
                self.store
                    .update(&merged)
                    .await
                    .map_err(|source| ReconcileError::Upsert {
                        key: key.clone(),
                        source,
                    })?;
                info!(bytes = rendered.content.len(), "Updated artifact");
                Ok(ReconcileOutcome::Updated)
            }
        }
    }
}

fn ensure_not_cancelled(key: &ArtifactKey, cancel: &CancellationToken) -> Result<(), ReconcileError> {
    if cancel.is_cancelled() {
        debug!("Cancelled before mutating {}", key);
        return Err(ReconcileError::Cancelled { key: key.clone() });
    }
    Ok(())
}
