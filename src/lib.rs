//! Telemetry Agent Operator Library
//!
//! Renders telemetry agent configuration from `TelemetryAgent` resources and
//! keeps it in managed Secrets. Unit tests live next to the code; scenario
//! tests for the reconcile engine are under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use telemetry_agent_operator::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
