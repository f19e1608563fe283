//! # Custom Resource Definitions
//!
//! CRD types for the Telemetry Agent Operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - Main CRD specification and default values
//! - `instances.rs` - Metrics and logs pipeline instances, secret selectors
//! - `status.rs` - Status types for tracking reconciliation state

mod instances;
mod spec;
mod status;

// Re-export all public types
pub use instances::{
    BasicAuth, LogsClient, LogsInstance, MetricsInstance, RemoteWrite, ScrapeJob,
    SecretKeySelector,
};
pub use spec::{
    default_false, default_log_level, default_scrape_interval, default_scrape_timeout,
    TelemetryAgent, TelemetryAgentSpec,
};
pub use status::{ArtifactStatus, Condition, TelemetryAgentStatus};
