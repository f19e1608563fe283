//! # TelemetryAgent Spec
//!
//! Main CRD specification types and default values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// TelemetryAgent Custom Resource Definition
///
/// Declares which telemetry pipelines an agent should run. The operator
/// renders one configuration Secret per pipeline kind (metrics, logs) and
/// removes it again once the kind has no instances left.
///
/// # Example
///
/// ```yaml
/// apiVersion: monitoring.octopilot.io/v1beta1
/// kind: TelemetryAgent
/// metadata:
///   name: agent1
///   namespace: monitoring
/// spec:
///   externalLabels:
///     cluster: prod-eu1
///   metrics:
///     - name: default
///       remoteWrite:
///         - url: https://prometheus.example.com/api/v1/write
///           basicAuth:
///             username: { name: remote-write, key: username }
///             password: { name: remote-write, key: password }
///       scrapeJobs:
///         - jobName: node
///           staticTargets: ["node-exporter:9100"]
///   logs:
///     - name: default
///       clients:
///         - url: https://loki.example.com/loki/api/v1/push
///           tenantId: team-a
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "TelemetryAgent",
    group = "monitoring.octopilot.io",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::TelemetryAgentStatus",
    shortname = "ta",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryAgentSpec {
    /// Metrics pipelines. When empty, no metrics configuration Secret is kept
    #[serde(default)]
    pub metrics: Vec<crate::crd::MetricsInstance>,
    /// Logs pipelines. When empty, no logs configuration Secret is kept
    #[serde(default)]
    pub logs: Vec<crate::crd::LogsInstance>,
    /// Agent log level written into the rendered configuration
    /// Values: debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Labels attached to every series and log stream shipped by this agent
    #[serde(default)]
    pub external_labels: BTreeMap<String, String>,
    /// Default scrape interval for metrics instances (e.g. "30s", "1m")
    #[serde(default = "default_scrape_interval")]
    pub scrape_interval: String,
    /// Default scrape timeout for metrics instances
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout: String,
    /// Suspend reconciliation
    /// When true, the operator leaves existing configuration Secrets untouched
    #[serde(default = "default_false")]
    pub suspend: bool,
}

/// Default value for the agent log level
pub fn default_log_level() -> String {
    "info".to_string()
}

/// Default value for the scrape interval
pub fn default_scrape_interval() -> String {
    "1m".to_string()
}

/// Default value for the scrape timeout
pub fn default_scrape_timeout() -> String {
    "10s".to_string()
}

/// Default value for boolean false
pub fn default_false() -> bool {
    false
}
