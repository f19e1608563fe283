//! # Telemetry Agent Operator
//!
//! A Kubernetes operator that renders telemetry agent configuration from
//! `TelemetryAgent` resources into managed Secrets.
//!
//! ## Overview
//!
//! For every TelemetryAgent the operator keeps up to two Secrets:
//!
//! 1. **`<name>-config`** - metrics agent configuration, present while `spec.metrics` is non-empty
//! 2. **`<name>-logs-config`** - logs agent configuration, present while `spec.logs` is non-empty
//!
//! Secrets carry the `app.kubernetes.io/managed-by` label and an owner
//! reference to the agent. Secrets without the label are never deleted.
//!
//! ## Configuration
//!
//! See [`telemetry_agent_operator::config::ControllerConfig`] for the
//! environment variables read at startup.

use anyhow::Result;
use telemetry_agent_operator::runtime::{initialization, watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialization::initialize().await?;

    watch_loop::run_watch_loop(init.agents, init.secrets, init.reconciler).await
}
