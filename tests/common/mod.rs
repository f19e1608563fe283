//! Common test utilities
//!
//! An in-memory [`ArtifactStore`] that records every call, plus fixtures for
//! TelemetryAgent resources and the secrets they reference.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use telemetry_agent_operator::constants::ARTIFACT_FILENAME;
use telemetry_agent_operator::controller::artifact::ownership::managed_by_labels;
use telemetry_agent_operator::prelude::*;
use tokio_util::sync::CancellationToken;

pub const NAMESPACE: &str = "monitoring";
pub const AGENT: &str = "agent1";
pub const UID: &str = "5d7c2a1e-0b1f-4c53-9d3e-1f0a6b2c9e11";

/// Store operation, for call logs and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Op {
    Get,
    Create,
    Update,
    Delete,
}

impl Op {
    pub fn is_mutation(self) -> bool {
        !matches!(self, Op::Get)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Conflict,
    Unavailable,
}

/// In-memory store keeping a log of every call it receives
#[derive(Default)]
pub struct RecordingStore {
    objects: Mutex<BTreeMap<ArtifactKey, PersistedObject>>,
    calls: Mutex<Vec<(Op, ArtifactKey)>>,
    failures: Mutex<BTreeMap<Op, Failure>>,
    cancel_on_get: Mutex<Option<CancellationToken>>,
    replace_on_get: Mutex<Option<PersistedObject>>,
    versions: AtomicU64,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording a call
    pub fn with_object(self, mut obj: PersistedObject) -> Self {
        self.stamp(&mut obj);
        self.objects.lock().unwrap().insert(obj.key.clone(), obj);
        self
    }

    pub fn fail_on(&self, op: Op, failure: Failure) {
        self.failures.lock().unwrap().insert(op, failure);
    }

    /// Cancel `token` while the next read is in flight
    pub fn cancel_during_get(&self, token: CancellationToken) {
        *self.cancel_on_get.lock().unwrap() = Some(token);
    }

    /// Swap in `replacement` (as a new object with its own uid) right after
    /// the next read has returned
    pub fn replace_after_get(&self, replacement: PersistedObject) {
        *self.replace_on_get.lock().unwrap() = Some(replacement);
    }

    /// Replace an object behind the engine's back, bumping its version
    pub fn tamper(&self, key: &ArtifactKey, edit: impl FnOnce(&mut PersistedObject)) {
        let version = self.next_version();
        let mut objects = self.objects.lock().unwrap();
        let obj = objects.get_mut(key).expect("object to tamper with");
        edit(obj);
        obj.resource_version = Some(version);
    }

    pub fn object(&self, key: &ArtifactKey) -> Option<PersistedObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn calls(&self) -> Vec<(Op, ArtifactKey)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls().into_iter().map(|(op, _)| op).collect()
    }

    pub fn mutations(&self) -> usize {
        self.ops().into_iter().filter(|op| op.is_mutation()).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn next_version(&self) -> String {
        (self.versions.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Give a freshly created object a version and a uid
    fn stamp(&self, obj: &mut PersistedObject) {
        let version = self.next_version();
        obj.uid = Some(format!("uid-{version}"));
        obj.resource_version = Some(version);
    }

    fn record(&self, op: Op, key: &ArtifactKey) -> Result<(), StoreError> {
        self.calls.lock().unwrap().push((op, key.clone()));
        match self.failures.lock().unwrap().get(&op) {
            Some(Failure::Conflict) => Err(StoreError::Conflict { key: key.clone() }),
            Some(Failure::Unavailable) => Err(StoreError::Other(anyhow!("connection refused"))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ArtifactStore for RecordingStore {
    async fn get(&self, key: &ArtifactKey) -> Result<Option<PersistedObject>, StoreError> {
        self.record(Op::Get, key)?;
        if let Some(token) = self.cancel_on_get.lock().unwrap().take() {
            token.cancel();
        }
        let current = self.object(key);
        if let Some(mut replacement) = self.replace_on_get.lock().unwrap().take() {
            self.stamp(&mut replacement);
            self.objects
                .lock()
                .unwrap()
                .insert(replacement.key.clone(), replacement);
        }
        Ok(current)
    }

    async fn create(&self, obj: &PersistedObject) -> Result<(), StoreError> {
        self.record(Op::Create, &obj.key)?;
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&obj.key) {
            return Err(StoreError::Conflict { key: obj.key.clone() });
        }
        let mut stored = obj.clone();
        self.stamp(&mut stored);
        objects.insert(obj.key.clone(), stored);
        Ok(())
    }

    async fn update(&self, obj: &PersistedObject) -> Result<(), StoreError> {
        self.record(Op::Update, &obj.key)?;
        let mut objects = self.objects.lock().unwrap();
        let current = objects.get(&obj.key).and_then(|o| o.resource_version.clone());
        if current.is_none() || current != obj.resource_version {
            return Err(StoreError::Conflict { key: obj.key.clone() });
        }
        let mut stored = obj.clone();
        stored.resource_version = Some(self.next_version());
        objects.insert(obj.key.clone(), stored);
        Ok(())
    }

    async fn delete(&self, obj: &PersistedObject) -> Result<(), StoreError> {
        self.record(Op::Delete, &obj.key)?;
        let mut objects = self.objects.lock().unwrap();
        let Some(current) = objects.get(&obj.key) else {
            return Ok(());
        };
        if current.uid != obj.uid || current.resource_version != obj.resource_version {
            return Err(StoreError::Conflict { key: obj.key.clone() });
        }
        objects.remove(&obj.key);
        Ok(())
    }
}

/// Resolver whose backend is always down
#[derive(Debug)]
pub struct UnreachableResolver;

#[async_trait]
impl SecretResolver for UnreachableResolver {
    async fn resolve(
        &self,
        _namespace: &str,
        _selector: &SecretKeySelector,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        Err(anyhow!("secret backend unavailable"))
    }
}

pub fn agent(spec: Value) -> TelemetryAgent {
    let spec: TelemetryAgentSpec = serde_json::from_value(spec).expect("valid spec");
    let mut agent = TelemetryAgent::new(AGENT, spec);
    agent.metadata.namespace = Some(NAMESPACE.to_string());
    agent.metadata.uid = Some(UID.to_string());
    agent
}

pub fn desired(spec: Value) -> DesiredState {
    DesiredState::from_agent(&agent(spec)).expect("agent has full metadata")
}

pub fn metrics_instance(name: &str) -> Value {
    json!({
        "name": name,
        "remoteWrite": [{
            "url": "https://prometheus.example.com/api/v1/write",
            "basicAuth": {
                "username": { "name": "remote-write", "key": "username" },
                "password": { "name": "remote-write", "key": "password" }
            }
        }],
        "scrapeJobs": [{
            "jobName": "node",
            "staticTargets": ["node-exporter:9100"]
        }]
    })
}

pub fn logs_instance(name: &str) -> Value {
    json!({
        "name": name,
        "clients": [{
            "url": "https://loki.example.com/loki/api/v1/push",
            "tenantId": "team-a",
            "bearerToken": { "name": "loki", "key": "token" }
        }]
    })
}

pub fn metrics_spec() -> Value {
    json!({ "metrics": [metrics_instance("default")] })
}

pub fn logs_spec() -> Value {
    json!({ "logs": [logs_instance("default")] })
}

pub fn empty_spec() -> Value {
    json!({})
}

/// Every secret the fixtures above reference
pub fn secrets() -> StaticSecretResolver {
    StaticSecretResolver::new()
        .with(NAMESPACE, "remote-write", "username", "prom-user")
        .with(NAMESPACE, "remote-write", "password", "s3cr3t")
        .with(NAMESPACE, "loki", "token", "loki-token")
}

pub fn metrics_key() -> ArtifactKey {
    resolve_key(NAMESPACE, AGENT, ArtifactKind::Metrics)
}

pub fn logs_key() -> ArtifactKey {
    resolve_key(NAMESPACE, AGENT, ArtifactKind::Logs)
}

/// An artifact Secret carrying our managed-by label
pub fn managed_object(key: ArtifactKey, content: &str) -> PersistedObject {
    PersistedObject {
        key,
        labels: managed_by_labels(),
        data: BTreeMap::from([(ARTIFACT_FILENAME.to_string(), content.as_bytes().to_vec())]),
        ..PersistedObject::default()
    }
}

/// A Secret at the artifact's name that somebody else created
pub fn foreign_object(key: ArtifactKey) -> PersistedObject {
    PersistedObject {
        key,
        labels: BTreeMap::from([("app".to_string(), "hand-written".to_string())]),
        data: BTreeMap::from([(ARTIFACT_FILENAME.to_string(), b"keep me".to_vec())]),
        ..PersistedObject::default()
    }
}
