//! # Initialization
//!
//! Operator initialization: rustls setup, tracing, metrics, HTTP server startup,
//! and Kubernetes client setup.

use crate::cluster::KubeClusterApi;
use crate::config::{OperatorConfig, SharedOperatorConfig};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{spawn_server, ServerHandle, ServerState};
use crate::crd::Istio;
use crate::observability;
use anyhow::{anyhow, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the operator
#[derive(Debug)]
pub struct InitializationResult {
    /// API for the Istio CRD
    pub istios: Api<Istio>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// HTTP server for metrics and probes; stopped separately from the operator
    pub server: ServerHandle,
    /// Cancelled on shutdown
    pub shutdown: CancellationToken,
}

/// Initialize the operator runtime
pub async fn initialize() -> Result<InitializationResult> {
    // rustls 0.23 needs a process-wide crypto provider before any TLS is used
    #[allow(clippy::map_err_ignore, reason = "the rejected provider carries no error detail")]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "istio_mesh_operator=info".into()),
        )
        .init();

    info!("Starting Istio mesh operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let config: SharedOperatorConfig = Arc::new(OperatorConfig::from_env());
    info!(
        istio_namespace = %config.istio_namespace,
        platform_namespaces = ?config.platform_namespaces,
        restart_chunk_size = config.restart_chunk_size,
        proxy_image = %config.proxy_image,
        "Operator configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let shutdown = CancellationToken::new();

    // Start HTTP server for metrics and probes
    let server = spawn_server(config.metrics_port, Arc::new(ServerState::default()));
    wait_for_server_ready(&config, &server).await?;

    let client = Client::try_default().await?;
    let istios: Api<Istio> = Api::all(client.clone());
    check_crd_installed(&istios).await;

    let api = Arc::new(KubeClusterApi::new(
        client,
        config.istio_namespace.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(api, config, shutdown.clone()));

    info!("Operator initialized, starting watch loop...");

    Ok(InitializationResult {
        istios,
        reconciler,
        server,
        shutdown,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(config: &OperatorConfig, server: &ServerHandle) -> Result<()> {
    let startup_timeout = std::time::Duration::from_secs(config.server_startup_timeout_secs);
    let poll_interval = std::time::Duration::from_millis(config.server_poll_interval_ms);
    let start_time = std::time::Instant::now();

    loop {
        if server.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        if server.state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Log whether the Istio CRD is queryable; the watch retries on its own if not
async fn check_crd_installed(istios: &Api<Istio>) {
    match istios.list(&ListParams::default()).await {
        Ok(list) => {
            info!(
                "CRD is queryable, found {} existing Istio resource(s)",
                list.items.len()
            );
            if list.items.len() > 1 {
                warn!("More than one Istio resource exists; each is reconciled independently");
            }
        }
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            warn!("Continuing despite CRD queryability check failure - controller will retry");
        }
    }
}
