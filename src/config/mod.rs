//! # Configuration
//!
//! Process-level settings. Everything is read once from the environment at
//! startup; there is no hot reload.

mod controller;

pub use controller::{parse_labels, ControllerConfig};
