//! # Runtime
//!
//! Process wiring around the reconciler.
//!
//! - `initialization`: rustls, tracing, metrics server, client and context setup
//! - `watch_loop`: the `kube_runtime::Controller` loop and signal handling
//! - `error_policy`: per-resource Fibonacci backoff for failed passes

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
