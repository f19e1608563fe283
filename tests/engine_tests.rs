//! # Reconcile Engine Tests
//!
//! Convergence of a single (owner, kind) artifact against an in-memory store.

mod common;

use common::*;
use serde_json::json;
use std::collections::BTreeMap;
use telemetry_agent_operator::constants::{
    AGENT_TYPE_LABEL, ARTIFACT_FILENAME, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
};
use telemetry_agent_operator::controller::artifact::ownership::is_managed;
use telemetry_agent_operator::prelude::*;
use tokio_util::sync::CancellationToken;

fn engine(store: RecordingStore) -> ReconcileEngine<RecordingStore, StaticSecretResolver> {
    ReconcileEngine::new(store, secrets())
}

#[tokio::test]
async fn test_creates_missing_artifact() {
    let engine = engine(RecordingStore::new());
    let desired = desired(metrics_spec());

    let outcome = engine
        .reconcile(&desired, ArtifactKind::Metrics, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Created);
    assert_eq!(engine.store().ops(), vec![Op::Get, Op::Create]);

    let expected = render(&desired, ArtifactKind::Metrics, &secrets()).await.unwrap();
    let stored = engine.store().object(&metrics_key()).unwrap();
    assert_eq!(stored.key.name, "agent1-config");
    assert_eq!(stored.payload(), Some(expected.content.as_slice()));
    assert_eq!(
        stored.labels.get(MANAGED_BY_LABEL).map(String::as_str),
        Some(MANAGED_BY_VALUE)
    );
    assert_eq!(stored.owner_references.len(), 1);
    assert_eq!(stored.owner_references[0].uid, UID);
    assert_eq!(stored.owner_references[0].kind, "TelemetryAgent");
    assert_eq!(stored.owner_references[0].block_owner_deletion, Some(true));
}

#[tokio::test]
async fn test_second_pass_is_a_no_op() {
    let engine = engine(RecordingStore::new());
    let desired = desired(metrics_spec());
    let cancel = CancellationToken::new();

    engine
        .reconcile(&desired, ArtifactKind::Metrics, &cancel)
        .await
        .unwrap();
    engine.store().clear_calls();

    let outcome = engine
        .reconcile(&desired, ArtifactKind::Metrics, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Unchanged);
    assert_eq!(engine.store().mutations(), 0);
    assert_eq!(engine.store().ops(), vec![Op::Get]);
}

#[tokio::test]
async fn test_deletes_managed_artifact_when_no_instances_remain() {
    let store = RecordingStore::new().with_object(managed_object(metrics_key(), "old"));
    let engine = engine(store);

    let outcome = engine
        .reconcile(&desired(empty_spec()), ArtifactKind::Metrics, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Deleted);
    assert_eq!(engine.store().ops(), vec![Op::Get, Op::Delete]);
    assert!(engine.store().object(&metrics_key()).is_none());
}

#[tokio::test]
async fn test_leaves_foreign_secret_alone_when_no_instances() {
    let store = RecordingStore::new().with_object(foreign_object(metrics_key()));
    let engine = engine(store);

    let outcome = engine
        .reconcile(&desired(empty_spec()), ArtifactKind::Metrics, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Foreign);
    assert_eq!(engine.store().mutations(), 0);
    let still_there = engine.store().object(&metrics_key()).unwrap();
    assert_eq!(still_there.payload(), Some("keep me".as_bytes()));
}

#[tokio::test]
async fn test_nothing_desired_and_nothing_present() {
    let engine = engine(RecordingStore::new());

    let outcome = engine
        .reconcile(&desired(empty_spec()), ArtifactKind::Logs, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Absent);
    assert_eq!(engine.store().ops(), vec![Op::Get]);
}

#[tokio::test]
async fn test_render_failure_keeps_last_good_artifact() {
    let store = RecordingStore::new().with_object(managed_object(metrics_key(), "last good"));
    let engine = engine(store);
    let broken = desired(json!({
        "metrics": [{
            "name": "default",
            "remoteWrite": [{ "url": "ftp://prometheus.example.com" }]
        }]
    }));

    let result = engine
        .reconcile(&broken, ArtifactKind::Metrics, &CancellationToken::new())
        .await;

    match result {
        Err(ReconcileError::Render(RenderError::RenderingFailed { diagnostics })) => {
            assert_eq!(diagnostics.entries.len(), 1);
            assert_eq!(diagnostics.entries[0].path, "metrics[0].remoteWrite[0].url");
        }
        other => panic!("expected RenderingFailed, got {other:?}"),
    }
    assert_eq!(engine.store().mutations(), 0);
    let kept = engine.store().object(&metrics_key()).unwrap();
    assert_eq!(kept.payload(), Some("last good".as_bytes()));
}

#[tokio::test]
async fn test_undefined_secret_is_not_retryable_and_does_not_mutate() {
    let resolver = StaticSecretResolver::new().with(NAMESPACE, "remote-write", "username", "u");
    let engine = ReconcileEngine::new(RecordingStore::new(), resolver);

    let err = engine
        .reconcile(&desired(metrics_spec()), ArtifactKind::Metrics, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    let text = err.to_string();
    assert!(text.contains("metrics[0].remoteWrite[0].basicAuth.password"), "{text}");
    assert!(text.contains("undefined secret reference"), "{text}");
    assert_eq!(engine.store().mutations(), 0);
}

#[tokio::test]
async fn test_secret_backend_outage_is_retryable() {
    let engine = ReconcileEngine::new(RecordingStore::new(), UnreachableResolver);

    let err = engine
        .reconcile(&desired(metrics_spec()), ArtifactKind::Metrics, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::Render(RenderError::SecretResolutionFailed { .. })
    ));
    assert!(err.is_retryable());
    assert_eq!(engine.store().mutations(), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_never_touches_the_store() {
    let engine = engine(RecordingStore::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .reconcile(&desired(metrics_spec()), ArtifactKind::Metrics, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Cancelled { .. }));
    assert!(err.is_retryable());
    assert!(engine.store().calls().is_empty());
}

#[tokio::test]
async fn test_cancellation_during_read_prevents_create() {
    let engine = engine(RecordingStore::new());
    let cancel = CancellationToken::new();
    engine.store().cancel_during_get(cancel.clone());

    let err = engine
        .reconcile(&desired(metrics_spec()), ArtifactKind::Metrics, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Cancelled { .. }));
    assert_eq!(engine.store().ops(), vec![Op::Get]);
    assert!(engine.store().object(&metrics_key()).is_none());
}

#[tokio::test]
async fn test_cancellation_during_read_prevents_delete() {
    let store = RecordingStore::new().with_object(managed_object(metrics_key(), "old"));
    let engine = engine(store);
    let cancel = CancellationToken::new();
    engine.store().cancel_during_get(cancel.clone());

    let err = engine
        .reconcile(&desired(empty_spec()), ArtifactKind::Metrics, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Cancelled { .. }));
    assert_eq!(engine.store().mutations(), 0);
    assert!(engine.store().object(&metrics_key()).is_some());
}

#[tokio::test]
async fn test_spec_change_updates_in_place() {
    let engine = engine(RecordingStore::new());
    let cancel = CancellationToken::new();
    engine
        .reconcile(&desired(metrics_spec()), ArtifactKind::Metrics, &cancel)
        .await
        .unwrap();
    let before = engine.store().object(&metrics_key()).unwrap();
    engine.store().clear_calls();

    let changed = desired(json!({
        "metrics": [metrics_instance("default")],
        "scrapeInterval": "30s"
    }));
    let outcome = engine
        .reconcile(&changed, ArtifactKind::Metrics, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Updated);
    assert_eq!(engine.store().ops(), vec![Op::Get, Op::Update]);
    let after = engine.store().object(&metrics_key()).unwrap();
    assert_ne!(before.payload(), after.payload());
    assert_ne!(before.resource_version, after.resource_version);
}

#[tokio::test]
async fn test_drifted_payload_is_repaired() {
    let engine = engine(RecordingStore::new());
    let desired = desired(metrics_spec());
    let cancel = CancellationToken::new();
    engine
        .reconcile(&desired, ArtifactKind::Metrics, &cancel)
        .await
        .unwrap();
    let original = engine.store().object(&metrics_key()).unwrap();

    engine.store().tamper(&metrics_key(), |obj| {
        obj.data.insert(ARTIFACT_FILENAME.to_string(), b"hand edited".to_vec());
    });
    let outcome = engine
        .reconcile(&desired, ArtifactKind::Metrics, &cancel)
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Updated);
    let repaired = engine.store().object(&metrics_key()).unwrap();
    assert_eq!(repaired.payload(), original.payload());
}

#[tokio::test]
async fn test_write_conflict_surfaces_as_retryable_upsert_error() {
    let store = RecordingStore::new().with_object(managed_object(metrics_key(), "old"));
    store.fail_on(Op::Update, Failure::Conflict);
    let engine = engine(store);

    let err = engine
        .reconcile(&desired(metrics_spec()), ArtifactKind::Metrics, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        ReconcileError::Upsert { key, source } => {
            assert_eq!(key, &metrics_key());
            assert!(source.is_conflict());
        }
        other => panic!("expected Upsert error, got {other:?}"),
    }
    assert!(err.is_retryable());
    assert_eq!(engine.store().ops(), vec![Op::Get, Op::Update]);
}

#[tokio::test]
async fn test_delete_failure_is_reported() {
    let store = RecordingStore::new().with_object(managed_object(metrics_key(), "old"));
    store.fail_on(Op::Delete, Failure::Unavailable);
    let engine = engine(store);

    let err = engine
        .reconcile(&desired(empty_spec()), ArtifactKind::Metrics, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Delete { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_delete_spares_object_recreated_after_read() {
    let store = RecordingStore::new().with_object(managed_object(metrics_key(), "old"));
    store.replace_after_get(foreign_object(metrics_key()));
    let engine = engine(store);

    let err = engine
        .reconcile(&desired(empty_spec()), ArtifactKind::Metrics, &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        ReconcileError::Delete { source, .. } => assert!(source.is_conflict()),
        other => panic!("expected delete conflict, got {other:?}"),
    }
    assert!(err.is_retryable());
    let survivor = engine.store().object(&metrics_key()).unwrap();
    assert!(!is_managed(&survivor));
    assert_eq!(survivor.payload(), Some("keep me".as_bytes()));
}

#[tokio::test]
async fn test_read_failure_is_reported() {
    let store = RecordingStore::new();
    store.fail_on(Op::Get, Failure::Unavailable);
    let engine = engine(store);

    let err = engine
        .reconcile(&desired(metrics_spec()), ArtifactKind::Metrics, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ReconcileError::Fetch { .. }));
    assert_eq!(engine.store().mutations(), 0);
}

#[tokio::test]
async fn test_logs_artifact_uses_its_own_secret() {
    let engine = engine(RecordingStore::new());

    let outcome = engine
        .reconcile(&desired(logs_spec()), ArtifactKind::Logs, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Created);
    let stored = engine.store().object(&logs_key()).unwrap();
    assert_eq!(stored.key.name, "agent1-logs-config");
    assert_eq!(stored.labels.get(AGENT_TYPE_LABEL).map(String::as_str), Some("logs"));
    assert!(engine.store().object(&metrics_key()).is_none());
}

#[tokio::test]
async fn test_kinds_reconcile_concurrently_without_interfering() {
    let engine = engine(RecordingStore::new());
    let desired = desired(json!({
        "metrics": [metrics_instance("default")],
        "logs": [logs_instance("default")]
    }));
    let cancel = CancellationToken::new();

    let (metrics, logs) = tokio::join!(
        engine.reconcile(&desired, ArtifactKind::Metrics, &cancel),
        engine.reconcile(&desired, ArtifactKind::Logs, &cancel),
    );

    assert_eq!(metrics.unwrap(), ReconcileOutcome::Created);
    assert_eq!(logs.unwrap(), ReconcileOutcome::Created);
    assert!(engine.store().object(&metrics_key()).is_some());
    assert!(engine.store().object(&logs_key()).is_some());
}

#[tokio::test]
async fn test_extra_labels_cannot_hide_ownership() {
    let labels = BTreeMap::from([
        ("team".to_string(), "observability".to_string()),
        (MANAGED_BY_LABEL.to_string(), "someone-else".to_string()),
    ]);
    let engine = engine(RecordingStore::new()).with_labels(labels);

    engine
        .reconcile(&desired(metrics_spec()), ArtifactKind::Metrics, &CancellationToken::new())
        .await
        .unwrap();

    let stored = engine.store().object(&metrics_key()).unwrap();
    assert_eq!(stored.labels.get("team").map(String::as_str), Some("observability"));
    assert!(is_managed(&stored));
}

#[tokio::test]
async fn test_upsert_adopts_foreign_secret_and_keeps_its_labels() {
    let store = RecordingStore::new().with_object(foreign_object(metrics_key()));
    let engine = engine(store);

    let outcome = engine
        .reconcile(&desired(metrics_spec()), ArtifactKind::Metrics, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Updated);
    let adopted = engine.store().object(&metrics_key()).unwrap();
    assert!(is_managed(&adopted));
    assert_eq!(adopted.labels.get("app").map(String::as_str), Some("hand-written"));
    assert_ne!(adopted.payload(), Some("keep me".as_bytes()));
}
