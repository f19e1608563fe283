//! # TACTL CLI
//!
//! Command-line interface for the Telemetry Agent Operator.
//!
//! ## Usage
//!
//! ```bash
//! # Render the metrics configuration for a TelemetryAgent manifest offline
//! tactl render -f agent.yaml --kind metrics --secrets secrets.yaml
//!
//! # List the configuration Secrets managed by the operator
//! tactl list
//! tactl list -n monitoring
//! ```
//!
//! `secrets.yaml` is a flat map of `"<namespace>/<name>/<key>": value`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;
use std::path::PathBuf;
use std::process::ExitCode;

mod list;
mod render;

/// Telemetry Agent Operator CLI
#[derive(Parser)]
#[command(name = "tactl")]
#[command(
    about = "Telemetry Agent Operator CLI",
    long_about = None,
    after_help = "\
Examples:
  tactl render -f agent.yaml --kind metrics
  tactl render -f agent.yaml --kind logs --secrets secrets.yaml
  tactl list -n monitoring
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render an artifact from a TelemetryAgent manifest without a cluster
    Render {
        /// TelemetryAgent manifest (YAML)
        #[arg(short = 'f', long = "file", value_name = "FILE")]
        file: PathBuf,

        /// Artifact kind: metrics or logs
        #[arg(long, value_name = "KIND")]
        kind: String,

        /// Secret values as a YAML map of "<namespace>/<name>/<key>": value
        #[arg(long, value_name = "FILE")]
        secrets: Option<PathBuf>,
    },
    /// List configuration Secrets managed by the operator
    List {
        /// Kubernetes namespace (defaults to all namespaces)
        #[arg(short, long)]
        namespace: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Required for rustls 0.23+ before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tactl=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            file,
            kind,
            secrets,
        } => render::render_command(&file, &kind, secrets.as_deref()).await,
        Commands::List { namespace } => {
            let client = Client::try_default()
                .await
                .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;
            list::list_command(client, namespace).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
