//! # Artifact Store
//!
//! Persistence seam for artifact Secrets. The engine only talks to
//! [`ArtifactStore`]; [`KubeSecretStore`] is the production implementation.
//!
//! Not-found is a regular outcome of [`ArtifactStore::get`] (`Ok(None)`) and
//! a successful [`ArtifactStore::delete`]. Optimistic-concurrency failures,
//! including a delete whose uid or version precondition no longer holds,
//! surface as [`StoreError::Conflict`].

use crate::controller::artifact::{ArtifactKey, PersistedObject};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, PostParams, Preconditions};
use kube::Client;
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Someone else wrote the object between our read and our write
    #[error("write conflict on {key}: object was modified concurrently")]
    Conflict { key: ArtifactKey },
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Fetch, create, update and delete persisted artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, key: &ArtifactKey) -> Result<Option<PersistedObject>, StoreError>;

    async fn create(&self, obj: &PersistedObject) -> Result<(), StoreError>;

    /// Replace an existing object; `obj.resource_version` must be the version
    /// that was read
    async fn update(&self, obj: &PersistedObject) -> Result<(), StoreError>;

    /// Delete the object that was read, and only that one: the store must
    /// refuse when the uid or version at the key no longer matches `obj`
    async fn delete(&self, obj: &PersistedObject) -> Result<(), StoreError>;
}

/// Opaque Secrets in the owner's namespace
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

impl fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

/// Kubernetes representation of a persisted artifact
#[must_use]
pub fn to_secret(obj: &PersistedObject) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(obj.key.name.clone()),
            namespace: Some(obj.key.namespace.clone()),
            labels: Some(obj.labels.clone()),
            annotations: (!obj.annotations.is_empty()).then(|| obj.annotations.clone()),
            finalizers: (!obj.finalizers.is_empty()).then(|| obj.finalizers.clone()),
            owner_references: Some(obj.owner_references.clone()),
            uid: obj.uid.clone(),
            resource_version: obj.resource_version.clone(),
            ..ObjectMeta::default()
        },
        type_: Some(
            obj.secret_type
                .clone()
                .unwrap_or_else(|| "Opaque".to_string()),
        ),
        data: Some(
            obj.data
                .iter()
                .map(|(file, bytes)| (file.clone(), ByteString(bytes.clone())))
                .collect(),
        ),
        ..Secret::default()
    }
}

/// Store-agnostic view of a Secret read back from the API server
#[must_use]
pub fn from_secret(key: &ArtifactKey, secret: Secret) -> PersistedObject {
    let meta = secret.metadata;
    PersistedObject {
        key: key.clone(),
        labels: meta.labels.unwrap_or_default(),
        annotations: meta.annotations.unwrap_or_default(),
        finalizers: meta.finalizers.unwrap_or_default(),
        owner_references: meta.owner_references.unwrap_or_default(),
        data: secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(file, bytes)| (file, bytes.0))
            .collect(),
        secret_type: secret.type_,
        uid: meta.uid,
        resource_version: meta.resource_version,
    }
}

fn classify(key: &ArtifactKey, err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict { key: key.clone() },
        other => StoreError::Kube(other),
    }
}

/// Delete options pinned to the uid and version that were read
#[must_use]
pub fn delete_params(obj: &PersistedObject) -> DeleteParams {
    DeleteParams {
        preconditions: Some(Preconditions {
            uid: obj.uid.clone(),
            resource_version: obj.resource_version.clone(),
        }),
        ..DeleteParams::default()
    }
}

#[async_trait]
impl ArtifactStore for KubeSecretStore {
    async fn get(&self, key: &ArtifactKey) -> Result<Option<PersistedObject>, StoreError> {
        let secret = self.api(&key.namespace).get_opt(&key.name).await?;
        Ok(secret.map(|s| from_secret(key, s)))
    }

    async fn create(&self, obj: &PersistedObject) -> Result<(), StoreError> {
        self.api(&obj.key.namespace)
            .create(&PostParams::default(), &to_secret(obj))
            .await
            .map_err(|e| classify(&obj.key, e))?;
        debug!("Created secret {}", obj.key);
        Ok(())
    }

    async fn update(&self, obj: &PersistedObject) -> Result<(), StoreError> {
        self.api(&obj.key.namespace)
            .replace(&obj.key.name, &PostParams::default(), &to_secret(obj))
            .await
            .map_err(|e| classify(&obj.key, e))?;
        debug!("Replaced secret {}", obj.key);
        Ok(())
    }

    async fn delete(&self, obj: &PersistedObject) -> Result<(), StoreError> {
        match self
            .api(&obj.key.namespace)
            .delete(&obj.key.name, &delete_params(obj))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!("Secret {} already gone", obj.key);
                Ok(())
            }
            Err(e) => Err(classify(&obj.key, e)),
        }
    }
}
