//! # Config Renderer
//!
//! Turns a [`DesiredState`] into the agent configuration file for one
//! [`ArtifactKind`].
//!
//! Rendering runs in three steps:
//!
//! 1. **Validate** the selected instances without touching any secret. Every
//!    problem is collected, not just the first.
//! 2. **Resolve** each distinct secret reference once through the
//!    [`SecretResolver`]. I/O failures here are infrastructure errors.
//! 3. **Build** a typed document and serialize it to YAML. Missing or
//!    non-UTF-8 secret material is reported as a diagnostic.
//!
//! Steps 1 and 3 are pure. Output is byte-stable for identical inputs: all
//! maps are ordered and instances are emitted sorted by name, so the engine
//! can compare old and new payloads without false positives.

mod document;
pub mod secrets;
pub mod validate;

pub use secrets::{KubeSecretResolver, ResolvedSecrets, SecretResolver, StaticSecretResolver};

use crate::controller::artifact::{ArtifactKind, DesiredState, RenderedArtifact};
use std::fmt;
use thiserror::Error;

/// One problem found while rendering, anchored at the offending construct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Location in the TelemetryAgent spec, e.g. `metrics[0].remoteWrite[1].url`
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// All problems found for one artifact
///
/// Displayed as a header line followed by one indented line per problem.
/// The text is meant for a human fixing their resource, so line breaks are
/// part of the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub subject: String,
    pub entries: Vec<Diagnostic>,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to render {} ({} problem{}):",
            self.subject,
            self.entries.len(),
            if self.entries.len() == 1 { "" } else { "s" }
        )?;
        for entry in &self.entries {
            write!(f, "\n  {entry}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    /// Only reachable when parsing a kind from text; the enum itself is closed
    #[error("unsupported artifact kind {0:?} (expected \"metrics\" or \"logs\")")]
    UnsupportedArtifactKind(String),
    /// The resource itself is wrong; retrying without a spec change won't help
    #[error("{diagnostics}")]
    RenderingFailed { diagnostics: Diagnostics },
    /// Secret lookup failed for infrastructure reasons; safe to retry
    #[error("failed to resolve secret reference {reference}")]
    SecretResolutionFailed {
        reference: String,
        #[source]
        source: anyhow::Error,
    },
}

impl RenderError {
    fn rendering_failed(subject: String, entries: Vec<Diagnostic>) -> Self {
        RenderError::RenderingFailed {
            diagnostics: Diagnostics { subject, entries },
        }
    }

    /// Diagnostics for a rendering failure, if that is what this is
    #[must_use]
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            RenderError::RenderingFailed { diagnostics } => Some(diagnostics),
            _ => None,
        }
    }
}

/// Render the configuration artifact of `kind` for `desired`
///
/// Has no side effects beyond the reads issued through `resolver`.
pub async fn render<R>(
    desired: &DesiredState,
    kind: ArtifactKind,
    resolver: &R,
) -> Result<RenderedArtifact, RenderError>
where
    R: SecretResolver + ?Sized,
{
    let problems = validate::validate(desired, kind);
    if !problems.is_empty() {
        return Err(RenderError::rendering_failed(subject(desired, kind), problems));
    }

    let references = secrets::references(desired, kind);
    let resolved =
        ResolvedSecrets::resolve(resolver, &desired.owner.namespace, references).await?;

    let content = render_resolved(desired, kind, &resolved)?;
    Ok(RenderedArtifact { kind, content })
}

/// Pure half of [`render`]: build and serialize with already-resolved secrets
pub fn render_resolved(
    desired: &DesiredState,
    kind: ArtifactKind,
    secrets: &ResolvedSecrets,
) -> Result<Vec<u8>, RenderError> {
    let mut builder = document::DocumentBuilder::new(desired, secrets);
    let serialized = match kind {
        ArtifactKind::Metrics => {
            let doc = builder.metrics_document();
            serde_yaml::to_string(&doc)
        }
        ArtifactKind::Logs => {
            let doc = builder.logs_document();
            serde_yaml::to_string(&doc)
        }
    };

    let mut problems = builder.into_diagnostics();
    match serialized {
        Ok(yaml) if problems.is_empty() => Ok(yaml.into_bytes()),
        Ok(_) => Err(RenderError::rendering_failed(subject(desired, kind), problems)),
        Err(e) => {
            problems.push(Diagnostic::new("<document>", format!("serialization failed: {e}")));
            Err(RenderError::rendering_failed(subject(desired, kind), problems))
        }
    }
}

fn subject(desired: &DesiredState, kind: ArtifactKind) -> String {
    format!(
        "{kind} config for {}/{}",
        desired.owner.namespace, desired.owner.name
    )
}
