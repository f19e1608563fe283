//! # Controller
//!
//! Core controller modules for the Telemetry Agent Operator.
//!
//! - `artifact`: artifact kinds, keys, desired state and the ownership gate
//! - `render`: validation, secret resolution and config rendering
//! - `store`: persistence seam for artifact Secrets
//! - `engine`: single-resource convergence
//! - `reconciler`: kube-runtime glue and status reporting
//! - `backoff`: Fibonacci backoff mechanism for retries
//! - `server`: HTTP server for metrics and health checks

pub mod artifact;
pub mod backoff;
pub mod engine;
pub mod reconciler;
pub mod render;
pub mod server;
pub mod store;
