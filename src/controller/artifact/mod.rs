//! # Artifacts
//!
//! Data model for the configuration artifacts the operator keeps in sync:
//!
//! - [`ArtifactKind`] - closed set of telemetry pipelines we render for
//! - [`ArtifactKey`] - stable identity of the Secret holding an artifact
//! - [`DesiredState`] - one owner's telemetry intent for a single pass
//! - [`PersistedObject`] - the store's view of an artifact Secret
//! - [`ownership`] - the managed-by gate guarding destructive actions

mod desired;
mod key;
mod object;
pub mod ownership;

pub use desired::{AgentSettings, DesiredState, DesiredStateError, OwnerIdentity};
pub use key::{artifact_name, resolve_key, ArtifactKey};
pub use object::{PersistedObject, RenderedArtifact};

use crate::controller::render::RenderError;
use std::fmt;
use std::str::FromStr;

/// Telemetry pipeline a configuration artifact is rendered for
///
/// Every consumer matches on this exhaustively, so adding a pipeline type is
/// a compile error until naming, rendering and selection all handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    Metrics,
    Logs,
}

impl ArtifactKind {
    /// All kinds, in the order a reconcile pass visits them
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Metrics, ArtifactKind::Logs];

    /// Lowercase name used in labels, metrics and status
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Metrics => "metrics",
            ArtifactKind::Logs => "logs",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metrics" => Ok(ArtifactKind::Metrics),
            "logs" => Ok(ArtifactKind::Logs),
            _ => Err(RenderError::UnsupportedArtifactKind(s.to_string())),
        }
    }
}
