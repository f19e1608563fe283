//! # Desired State
//!
//! Snapshot of one TelemetryAgent's intent, built fresh for each pass.

use super::ArtifactKind;
use crate::crd::{LogsInstance, MetricsInstance, TelemetryAgent};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DesiredStateError {
    #[error("TelemetryAgent is missing metadata.{0}")]
    MissingMetadata(&'static str),
}

/// Identity of the parent resource, copied verbatim into owner references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub uid: String,
}

impl OwnerIdentity {
    /// Owner reference that lets the API server garbage-collect the artifact
    /// and blocks foreground deletion of the owner until it is gone
    #[must_use]
    pub fn to_owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            block_owner_deletion: Some(true),
            controller: None,
        }
    }
}

/// Agent-wide settings shared by both artifact kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub log_level: String,
    pub external_labels: BTreeMap<String, String>,
    pub scrape_interval: String,
    pub scrape_timeout: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            log_level: crate::crd::default_log_level(),
            external_labels: BTreeMap::new(),
            scrape_interval: crate::crd::default_scrape_interval(),
            scrape_timeout: crate::crd::default_scrape_timeout(),
        }
    }
}

/// One owner's telemetry intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub owner: OwnerIdentity,
    pub metrics: Vec<MetricsInstance>,
    pub logs: Vec<LogsInstance>,
    pub settings: AgentSettings,
}

impl DesiredState {
    /// Build the desired state from a TelemetryAgent
    ///
    /// Name, namespace and uid are required: without them we can neither
    /// name the artifact nor point an owner reference back at the agent.
    pub fn from_agent(agent: &TelemetryAgent) -> Result<Self, DesiredStateError> {
        let meta = agent.meta();
        let name = meta
            .name
            .clone()
            .ok_or(DesiredStateError::MissingMetadata("name"))?;
        let namespace = meta
            .namespace
            .clone()
            .ok_or(DesiredStateError::MissingMetadata("namespace"))?;
        let uid = meta
            .uid
            .clone()
            .ok_or(DesiredStateError::MissingMetadata("uid"))?;

        let spec = &agent.spec;
        Ok(Self {
            owner: OwnerIdentity {
                api_version: TelemetryAgent::api_version(&()).into_owned(),
                kind: TelemetryAgent::kind(&()).into_owned(),
                name,
                namespace,
                uid,
            },
            metrics: spec.metrics.clone(),
            logs: spec.logs.clone(),
            settings: AgentSettings {
                log_level: spec.log_level.clone(),
                external_labels: spec.external_labels.clone(),
                scrape_interval: spec.scrape_interval.clone(),
                scrape_timeout: spec.scrape_timeout.clone(),
            },
        })
    }

    /// An artifact should exist iff the matching instance list is non-empty
    #[must_use]
    pub fn should_exist(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::Metrics => !self.metrics.is_empty(),
            ArtifactKind::Logs => !self.logs.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::TelemetryAgentSpec;

    fn agent(uid: Option<&str>) -> TelemetryAgent {
        let spec: TelemetryAgentSpec = serde_json::from_value(serde_json::json!({
            "metrics": [{ "name": "default" }]
        }))
        .unwrap();
        let mut agent = TelemetryAgent::new("agent1", spec);
        agent.metadata.namespace = Some("monitoring".to_string());
        agent.metadata.uid = uid.map(str::to_string);
        agent
    }

    #[test]
    fn test_from_agent_copies_owner_identity() {
        let desired = DesiredState::from_agent(&agent(Some("uid-1"))).unwrap();

        assert_eq!(desired.owner.api_version, "monitoring.octopilot.io/v1beta1");
        assert_eq!(desired.owner.kind, "TelemetryAgent");
        assert_eq!(desired.owner.name, "agent1");
        assert_eq!(desired.owner.namespace, "monitoring");
        assert_eq!(desired.owner.uid, "uid-1");
        assert!(desired.should_exist(ArtifactKind::Metrics));
        assert!(!desired.should_exist(ArtifactKind::Logs));
    }

    #[test]
    fn test_from_agent_requires_uid() {
        assert_eq!(
            DesiredState::from_agent(&agent(None)),
            Err(DesiredStateError::MissingMetadata("uid"))
        );
    }

    #[test]
    fn test_owner_reference_blocks_owner_deletion() {
        let desired = DesiredState::from_agent(&agent(Some("uid-1"))).unwrap();
        let owner_ref = desired.owner.to_owner_reference();

        assert_eq!(owner_ref.block_owner_deletion, Some(true));
        assert_eq!(owner_ref.uid, "uid-1");
        assert_eq!(owner_ref.controller, None);
    }
}
