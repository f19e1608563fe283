//! # Artifact Keys
//!
//! Maps an (owner, kind) pair to the namespace/name of the Secret that holds
//! the rendered artifact. Naming is a pure function of its inputs so that
//! every pass targets the same object.

use super::ArtifactKind;
use std::fmt;

/// Namespace and name of a persisted artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactKey {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Secret name for an owner's artifact of the given kind
///
/// - metrics: `<owner>-config`
/// - logs: `<owner>-logs-config`
#[must_use]
pub fn artifact_name(owner_name: &str, kind: ArtifactKind) -> String {
    match kind {
        ArtifactKind::Metrics => format!("{owner_name}-config"),
        ArtifactKind::Logs => format!("{owner_name}-logs-config"),
    }
}

/// Resolve the key of the artifact Secret; it always lives beside its owner
#[must_use]
pub fn resolve_key(owner_namespace: &str, owner_name: &str, kind: ArtifactKind) -> ArtifactKey {
    ArtifactKey {
        namespace: owner_namespace.to_string(),
        name: artifact_name(owner_name, kind),
    }
}
