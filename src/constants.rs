//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! The managed-by label pair is the single source of truth for both the
//! ownership check and the labels stamped on every artifact we create.
//! Everything else here is a default that can be overridden via
//! environment variables (see [`crate::config::ControllerConfig`]).

/// Label key marking objects this operator is allowed to mutate or delete
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Sentinel value for [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "telemetry-agent-operator";

/// Label carrying the name of the owning TelemetryAgent
pub const AGENT_NAME_LABEL: &str = "monitoring.octopilot.io/name";

/// Label carrying the artifact kind (`metrics` or `logs`)
pub const AGENT_TYPE_LABEL: &str = "monitoring.octopilot.io/type";

/// Annotation listing the caller-supplied label keys applied on the last
/// write, so keys dropped from `ARTIFACT_LABELS` can be removed again
pub const APPLIED_LABELS_ANNOTATION: &str = "monitoring.octopilot.io/applied-labels";

/// Payload key under which the rendered configuration is stored
pub const ARTIFACT_FILENAME: &str = "agent.yml";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "telemetry-agent-operator";

/// WAL directory written into rendered metrics configuration
pub const DEFAULT_WAL_DIRECTORY: &str = "/var/lib/telemetry-agent/data";

/// Positions directory written into rendered logs configuration
pub const DEFAULT_POSITIONS_DIRECTORY: &str = "/var/lib/telemetry-agent/data";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default requeue interval after a successful reconciliation (seconds)
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Default Fibonacci backoff floor for reconciliation errors (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;

/// Default Fibonacci backoff ceiling for reconciliation errors (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default delay before restarting the watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;
