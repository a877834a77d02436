//! # Watch Loop
//!
//! Runs the kube-runtime controller for Istio resources until shutdown.

use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerHandle;
use crate::crd::Istio;
use crate::runtime::error_policy::error_policy;
use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::watcher::Config as WatcherConfig;
use kube_runtime::Controller;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Watch Istio resources and reconcile them until a shutdown signal arrives
///
/// The first signal cancels in-flight reconciliations at their next cluster call
/// and lets the controller drain. The HTTP server is stopped only after that.
pub async fn run_watch_loop(
    istios: Api<Istio>,
    reconciler: Arc<Reconciler>,
    server: ServerHandle,
    shutdown: CancellationToken,
) -> Result<()> {
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, cancelling in-flight reconciliations");
        signal_token.cancel();
    });

    Controller::new(istios, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|result| {
            match result {
                Ok((object, action)) => {
                    debug!(resource = %object.name, ?action, "Istio reconciliation completed");
                }
                Err(e) => error!(error = %e, "Istio reconciliation error"),
            }
            std::future::ready(())
        })
        .await;

    info!("Controller stopped");
    shutdown.cancel();
    server.stop().await;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
