//! # CRD Generator
//!
//! Prints the `TelemetryAgent` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/telemetryagent.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use telemetry_agent_operator::crd::TelemetryAgent;

fn main() -> anyhow::Result<()> {
    let crd = TelemetryAgent::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
