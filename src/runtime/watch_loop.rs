//! # Watch Loop
//!
//! Controller watch loop that monitors TelemetryAgent resources and the
//! Secrets we manage, and triggers reconciliation when either changes.

use crate::constants::AGENT_NAME_LABEL;
use crate::controller::artifact::ownership::managed_by_selector;
use crate::controller::reconciler::{agent_key, reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::TelemetryAgent;
use crate::runtime::error_policy::handle_reconciliation_error;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Error as ControllerError;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Map a managed Secret back to the TelemetryAgent named in its labels
///
/// Edits to (or deletion of) an artifact Secret re-run the owner's pass so
/// drift is repaired without waiting for the periodic requeue.
#[must_use]
pub fn owner_of(secret: &Secret) -> Option<ObjectRef<TelemetryAgent>> {
    let namespace = secret.namespace()?;
    let name = secret.labels().get(AGENT_NAME_LABEL)?;
    Some(ObjectRef::new(name).within(&namespace))
}

/// Cancel `shutdown` and drop readiness on SIGTERM or SIGINT
pub fn spawn_signal_handler(shutdown: CancellationToken, server_state: Arc<ServerState>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal, initiating graceful shutdown...");
        server_state.set_ready(false);
        shutdown.cancel();
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler, falling back to SIGINT only");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => debug!("SIGTERM"),
            _ = tokio::signal::ctrl_c() => debug!("SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Run the controller until shutdown, restarting the stream if it ends
pub async fn run_watch_loop(
    agents: Api<TelemetryAgent>,
    secrets: Api<Secret>,
    reconciler: Arc<Reconciler>,
) -> Result<(), anyhow::Error> {
    let shutdown = reconciler.shutdown.clone();
    let restart_delay = reconciler.config.watch_restart_delay();
    let selector = managed_by_selector();

    loop {
        if shutdown.is_cancelled() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        info!("Starting controller watch loop...");
        Controller::new(agents.clone(), watcher::Config::default().any_semantic())
            .watches(
                secrets.clone(),
                watcher::Config::default().labels(&selector),
                |secret: Secret| owner_of(&secret),
            )
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .for_each(|result| {
                let reconciler = Arc::clone(&reconciler);
                async move {
                    match result {
                        Ok((obj, action)) => {
                            debug!(resource = %obj, ?action, "watch.event.reconciled");
                        }
                        // A requeue fired for an agent that has since been deleted
                        Err(ControllerError::ObjectNotFound(gone)) => {
                            let key = agent_key(gone.namespace.as_deref(), &gone.name);
                            if reconciler.backoff.forget(&key) {
                                debug!(resource = key.as_str(), "Dropped backoff state of deleted agent");
                            }
                        }
                        Err(e) => warn!(error = %e, "Controller stream error"),
                    }
                }
            })
            .await;

        if shutdown.is_cancelled() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}
