//! # List Command
//!
//! Command to list the configuration Secrets managed by the operator.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use telemetry_agent_operator::constants::{AGENT_NAME_LABEL, AGENT_TYPE_LABEL};
use telemetry_agent_operator::controller::artifact::ownership::managed_by_selector;

/// List all managed configuration Secrets
pub async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<Secret> = if let Some(ns) = &namespace {
        println!("Listing managed configuration Secrets in namespace '{ns}'...");
        Api::namespaced(client, ns)
    } else {
        println!("Listing managed configuration Secrets in all namespaces...");
        Api::all(client)
    };

    let secrets = api
        .list(&ListParams::default().labels(&managed_by_selector()))
        .await
        .context("Failed to list Secrets")?;

    if secrets.items.is_empty() {
        println!("No managed configuration Secrets found.");
        return Ok(());
    }

    println!(
        "\n{:<40} {:<20} {:<25} {:<8} {:<10}",
        "NAME", "NAMESPACE", "AGENT", "TYPE", "SIZE"
    );
    println!("{}", "-".repeat(107));

    for secret in &secrets.items {
        let labels = secret.labels();
        let size: usize = secret
            .data
            .as_ref()
            .map_or(0, |data| data.values().map(|v| v.0.len()).sum());

        println!(
            "{:<40} {:<20} {:<25} {:<8} {:<10}",
            secret.name_any(),
            secret.namespace().unwrap_or_default(),
            labels.get(AGENT_NAME_LABEL).map_or("<none>", String::as_str),
            labels.get(AGENT_TYPE_LABEL).map_or("<none>", String::as_str),
            format!("{size}B"),
        );
    }

    Ok(())
}
