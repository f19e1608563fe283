//! # Secret Resolution
//!
//! Credentials referenced by a TelemetryAgent are pulled in through the
//! [`SecretResolver`] seam. The controller uses [`KubeSecretResolver`]; the
//! CLI and tests use [`StaticSecretResolver`].

use crate::controller::artifact::{ArtifactKind, DesiredState};
use crate::controller::render::RenderError;
use crate::crd::{BasicAuth, SecretKeySelector};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// Source of secret material for the renderer
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Fetch the value of `selector` in `namespace`
    ///
    /// Returns `Ok(None)` when the Secret or the key does not exist; that is
    /// a problem with the resource, reported as a rendering diagnostic.
    /// `Err` is reserved for I/O failures worth retrying.
    async fn resolve(&self, namespace: &str, selector: &SecretKeySelector)
        -> Result<Option<Vec<u8>>>;
}

/// Reads Secrets from the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretResolver {
    client: Client,
}

impl KubeSecretResolver {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl fmt::Debug for KubeSecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeSecretResolver").finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretResolver for KubeSecretResolver {
    async fn resolve(
        &self,
        namespace: &str,
        selector: &SecretKeySelector,
    ) -> Result<Option<Vec<u8>>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets
            .get_opt(&selector.name)
            .await
            .with_context(|| format!("failed to get secret {namespace}/{}", selector.name))?;

        Ok(secret
            .and_then(|s| s.data)
            .and_then(|mut data| data.remove(&selector.key))
            .map(|bytes| bytes.0))
    }
}

/// In-memory resolver keyed by `(namespace, name, key)`
#[derive(Default, Clone)]
pub struct StaticSecretResolver {
    values: BTreeMap<(String, String, String), Vec<u8>>,
}

impl StaticSecretResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, namespace: &str, name: &str, key: &str, value: impl Into<Vec<u8>>) {
        self.values.insert(
            (namespace.to_string(), name.to_string(), key.to_string()),
            value.into(),
        );
    }

    #[must_use]
    pub fn with(mut self, namespace: &str, name: &str, key: &str, value: impl Into<Vec<u8>>) -> Self {
        self.insert(namespace, name, key, value);
        self
    }

    /// Build from a flat map of `"<namespace>/<name>/<key>" -> value`
    pub fn from_flat_map(entries: BTreeMap<String, String>) -> Result<Self> {
        let mut resolver = Self::new();
        for (path, value) in entries {
            let mut parts = path.splitn(3, '/');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(ns), Some(name), Some(key))
                    if !ns.is_empty() && !name.is_empty() && !key.is_empty() =>
                {
                    resolver.insert(ns, name, key, value);
                }
                _ => anyhow::bail!(
                    "invalid secret path {path:?}, expected <namespace>/<name>/<key>"
                ),
            }
        }
        Ok(resolver)
    }
}

impl fmt::Debug for StaticSecretResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSecretResolver")
            .field("entries", &self.values.len())
            .finish()
    }
}

impl Drop for StaticSecretResolver {
    fn drop(&mut self) {
        for value in self.values.values_mut() {
            value.zeroize();
        }
    }
}

#[async_trait]
impl SecretResolver for StaticSecretResolver {
    async fn resolve(
        &self,
        namespace: &str,
        selector: &SecretKeySelector,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self
            .values
            .get(&(
                namespace.to_string(),
                selector.name.clone(),
                selector.key.clone(),
            ))
            .cloned())
    }
}

/// Every distinct secret reference used by the instances of `kind`
#[must_use]
pub fn references(desired: &DesiredState, kind: ArtifactKind) -> BTreeSet<SecretKeySelector> {
    fn auth_refs(
        refs: &mut BTreeSet<SecretKeySelector>,
        basic_auth: Option<&BasicAuth>,
        bearer_token: Option<&SecretKeySelector>,
    ) {
        if let Some(auth) = basic_auth {
            refs.insert(auth.username.clone());
            refs.insert(auth.password.clone());
        }
        if let Some(token) = bearer_token {
            refs.insert(token.clone());
        }
    }

    let mut refs = BTreeSet::new();
    match kind {
        ArtifactKind::Metrics => {
            for rw in desired.metrics.iter().flat_map(|m| &m.remote_write) {
                auth_refs(&mut refs, rw.basic_auth.as_ref(), rw.bearer_token.as_ref());
            }
        }
        ArtifactKind::Logs => {
            for client in desired.logs.iter().flat_map(|l| &l.clients) {
                auth_refs(&mut refs, client.basic_auth.as_ref(), client.bearer_token.as_ref());
            }
        }
    }
    refs
}

enum ResolvedValue {
    Text(Zeroizing<String>),
    NotUtf8,
}

/// Outcome of looking up a reference in [`ResolvedSecrets`]
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    Text(&'a str),
    NotUtf8,
    Undefined,
}

/// Secret material fetched for one render; wiped on drop
#[derive(Default)]
pub struct ResolvedSecrets {
    values: BTreeMap<SecretKeySelector, ResolvedValue>,
}

impl ResolvedSecrets {
    /// Resolve each reference once, stopping at the first I/O failure
    pub async fn resolve<R>(
        resolver: &R,
        namespace: &str,
        references: BTreeSet<SecretKeySelector>,
    ) -> Result<Self, RenderError>
    where
        R: SecretResolver + ?Sized,
    {
        let mut resolved = Self::default();
        for selector in references {
            match resolver.resolve(namespace, &selector).await {
                Ok(Some(bytes)) => resolved.insert(selector, bytes),
                Ok(None) => {
                    debug!(
                        "Secret reference {}/{}[{}] is undefined",
                        namespace, selector.name, selector.key
                    );
                }
                Err(source) => {
                    return Err(RenderError::SecretResolutionFailed {
                        reference: format!("{namespace}/{}[{}]", selector.name, selector.key),
                        source,
                    });
                }
            }
        }
        Ok(resolved)
    }

    /// Add a resolved value; non-UTF-8 material is remembered as such and wiped
    pub fn insert(&mut self, selector: SecretKeySelector, bytes: Vec<u8>) {
        let value = match String::from_utf8(bytes) {
            Ok(text) => ResolvedValue::Text(Zeroizing::new(text)),
            Err(e) => {
                let mut raw = e.into_bytes();
                raw.zeroize();
                ResolvedValue::NotUtf8
            }
        };
        self.values.insert(selector, value);
    }

    #[must_use]
    pub fn lookup(&self, selector: &SecretKeySelector) -> Lookup<'_> {
        match self.values.get(selector) {
            Some(ResolvedValue::Text(text)) => Lookup::Text(text.as_str()),
            Some(ResolvedValue::NotUtf8) => Lookup::NotUtf8,
            None => Lookup::Undefined,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("references", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}
