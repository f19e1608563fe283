//! # Render Command
//!
//! Offline rendering of a TelemetryAgent manifest, using the same renderer
//! as the operator with secrets served from a local file.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use telemetry_agent_operator::controller::artifact::{ArtifactKind, DesiredState};
use telemetry_agent_operator::controller::render::{render, RenderError, StaticSecretResolver};
use telemetry_agent_operator::crd::TelemetryAgent;

/// Placeholder uid for manifests that were never applied to a cluster
const OFFLINE_UID: &str = "00000000-0000-0000-0000-000000000000";

pub async fn render_command(file: &Path, kind: &str, secrets: Option<&Path>) -> Result<ExitCode> {
    let kind: ArtifactKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => {
            eprintln!("{e}");
            return Ok(ExitCode::from(2));
        }
    };

    let manifest = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut agent: TelemetryAgent = serde_yaml::from_str(&manifest)
        .with_context(|| format!("{} is not a valid TelemetryAgent manifest", file.display()))?;
    fill_offline_metadata(&mut agent);

    let desired = DesiredState::from_agent(&agent)?;
    let resolver = match secrets {
        Some(path) => load_secrets(path)?,
        None => StaticSecretResolver::new(),
    };

    match render(&desired, kind, &resolver).await {
        Ok(artifact) => {
            std::io::stdout()
                .lock()
                .write_all(&artifact.content)
                .context("Failed to write rendered configuration")?;
            Ok(ExitCode::SUCCESS)
        }
        Err(RenderError::RenderingFailed { diagnostics }) => {
            eprintln!("{diagnostics}");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

/// Default the metadata the API server would normally assign
fn fill_offline_metadata(agent: &mut TelemetryAgent) {
    let meta = &mut agent.metadata;
    if meta.namespace.is_none() {
        meta.namespace = Some("default".to_string());
    }
    if meta.uid.is_none() {
        meta.uid = Some(OFFLINE_UID.to_string());
    }
}

fn load_secrets(path: &Path) -> Result<StaticSecretResolver> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let entries: BTreeMap<String, String> = serde_yaml::from_str(&raw)
        .with_context(|| format!("{} must be a map of \"<namespace>/<name>/<key>\": value", path.display()))?;
    StaticSecretResolver::from_flat_map(entries)
}
