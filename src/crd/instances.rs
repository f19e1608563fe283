//! # Pipeline Instances
//!
//! Metrics and logs instance types embedded in a TelemetryAgent, plus the
//! secret key selectors used to pull credentials into the rendered config.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to a single key inside a Secret in the agent's namespace
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Secret name
    pub name: String,
    /// Key within the Secret's data
    pub key: String,
}

/// HTTP basic authentication sourced from Secrets
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuth {
    pub username: SecretKeySelector,
    pub password: SecretKeySelector,
}

/// A metrics pipeline: what to scrape and where to ship it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsInstance {
    /// Instance name, unique within the agent
    pub name: String,
    /// Remote write endpoints
    #[serde(default)]
    pub remote_write: Vec<RemoteWrite>,
    /// Static scrape jobs
    #[serde(default)]
    pub scrape_jobs: Vec<ScrapeJob>,
    /// How often the WAL is truncated (duration string)
    #[serde(default)]
    pub wal_truncate_frequency: Option<String>,
}

/// Prometheus remote write endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteWrite {
    /// Endpoint URL (http or https)
    pub url: String,
    /// Basic authentication (mutually exclusive with bearerToken)
    #[serde(default)]
    pub basic_auth: Option<BasicAuth>,
    /// Bearer token (mutually exclusive with basicAuth)
    #[serde(default)]
    pub bearer_token: Option<SecretKeySelector>,
    /// Extra HTTP headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request timeout (duration string)
    #[serde(default)]
    pub remote_timeout: Option<String>,
}

/// Static scrape job
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeJob {
    /// Prometheus job name
    pub job_name: String,
    /// `host:port` targets
    #[serde(default)]
    pub static_targets: Vec<String>,
    /// HTTP path to scrape (defaults to /metrics in the agent)
    #[serde(default)]
    pub metrics_path: Option<String>,
    /// http or https
    #[serde(default)]
    pub scheme: Option<String>,
    /// Overrides the agent-wide scrape interval
    #[serde(default)]
    pub scrape_interval: Option<String>,
    /// Labels attached to every target of this job
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A logs pipeline: where to push collected log streams
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogsInstance {
    /// Instance name, unique within the agent
    pub name: String,
    /// Push endpoints
    #[serde(default)]
    pub clients: Vec<LogsClient>,
    /// Positions file override; defaults to `<positions dir>/<instance>.yml`
    #[serde(default)]
    pub positions_file: Option<String>,
}

/// Log push endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogsClient {
    /// Push URL (http or https)
    pub url: String,
    /// Tenant sent in the X-Scope-OrgID header
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub basic_auth: Option<BasicAuth>,
    #[serde(default)]
    pub bearer_token: Option<SecretKeySelector>,
    /// Labels added to every stream pushed through this client
    #[serde(default)]
    pub external_labels: BTreeMap<String, String>,
}
