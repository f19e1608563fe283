//! # Persisted Objects
//!
//! Store-agnostic view of an artifact Secret plus the rules for building the
//! desired object and folding it onto whatever already exists.

use super::{ownership, ArtifactKey, ArtifactKind, OwnerIdentity};
use crate::constants::{
    AGENT_NAME_LABEL, AGENT_TYPE_LABEL, APPLIED_LABELS_ANNOTATION, ARTIFACT_FILENAME,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeMap;

/// Output of the renderer, not yet wrapped in a store object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub kind: ArtifactKind,
    pub content: Vec<u8>,
}

/// An artifact Secret as seen by (or sent to) the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedObject {
    pub key: ArtifactKey,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub finalizers: Vec<String>,
    pub owner_references: Vec<OwnerReference>,
    /// Filename to bytes
    pub data: BTreeMap<String, Vec<u8>>,
    /// Secret type; `None` means the store default (`Opaque`)
    pub secret_type: Option<String>,
    /// Server-assigned identity, used as a delete precondition
    pub uid: Option<String>,
    /// Version observed on read; sent back on update for optimistic concurrency
    pub resource_version: Option<String>,
}

impl PersistedObject {
    /// Build the object we want in the store for a rendered artifact
    ///
    /// Labels are layered so the managed-by sentinel can never be overridden
    /// by caller-supplied labels. The caller keys are recorded in an
    /// annotation so a later merge knows which labels it may drop.
    #[must_use]
    pub fn for_artifact(
        key: ArtifactKey,
        owner: &OwnerIdentity,
        artifact: &RenderedArtifact,
        extra_labels: &BTreeMap<String, String>,
    ) -> Self {
        let mut labels = extra_labels.clone();
        labels.insert(AGENT_NAME_LABEL.to_string(), owner.name.clone());
        labels.insert(AGENT_TYPE_LABEL.to_string(), artifact.kind.as_str().to_string());
        labels.extend(ownership::managed_by_labels());

        let mut annotations = BTreeMap::new();
        if !extra_labels.is_empty() {
            let keys: Vec<&str> = extra_labels.keys().map(String::as_str).collect();
            annotations.insert(APPLIED_LABELS_ANNOTATION.to_string(), keys.join(","));
        }

        Self {
            key,
            labels,
            annotations,
            owner_references: vec![owner.to_owner_reference()],
            data: BTreeMap::from([(ARTIFACT_FILENAME.to_string(), artifact.content.clone())]),
            ..Self::default()
        }
    }

    /// Rendered configuration bytes, if present
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        self.data.get(ARTIFACT_FILENAME).map(Vec::as_slice)
    }

    /// Caller label keys recorded on the last write by this operator
    fn applied_label_keys(&self) -> impl Iterator<Item = &str> {
        self.annotations
            .get(APPLIED_LABELS_ANNOTATION)
            .into_iter()
            .flat_map(|keys| keys.split(','))
            .filter(|key| !key.is_empty())
    }

    /// Fold this desired object onto an existing one
    ///
    /// Labels, annotations and owner references set by others survive; ours
    /// win on conflict (owner references are matched by uid). Caller labels
    /// we applied earlier but no longer want are dropped. Finalizers, type,
    /// uid and resource version come from the existing object. The payload
    /// is replaced wholesale.
    #[must_use]
    pub fn merged_onto(&self, existing: &PersistedObject) -> PersistedObject {
        let mut labels = existing.labels.clone();
        for key in existing.applied_label_keys() {
            labels.remove(key);
        }
        labels.extend(self.labels.clone());

        let mut annotations = existing.annotations.clone();
        annotations.remove(APPLIED_LABELS_ANNOTATION);
        annotations.extend(self.annotations.clone());

        let mut owner_references = existing.owner_references.clone();
        for desired_ref in &self.owner_references {
            match owner_references
                .iter_mut()
                .find(|existing_ref| existing_ref.uid == desired_ref.uid)
            {
                Some(existing_ref) => *existing_ref = desired_ref.clone(),
                None => owner_references.push(desired_ref.clone()),
            }
        }

        PersistedObject {
            key: self.key.clone(),
            labels,
            annotations,
            finalizers: existing.finalizers.clone(),
            owner_references,
            data: self.data.clone(),
            secret_type: existing.secret_type.clone().or_else(|| self.secret_type.clone()),
            uid: existing.uid.clone(),
            resource_version: existing.resource_version.clone(),
        }
    }

    /// Equality that ignores server-assigned identity and version
    #[must_use]
    pub fn has_same_content(&self, other: &PersistedObject) -> bool {
        self.key == other.key
            && self.labels == other.labels
            && self.annotations == other.annotations
            && self.finalizers == other.finalizers
            && self.owner_references == other.owner_references
            && self.data == other.data
            && self.secret_type == other.secret_type
    }
}
