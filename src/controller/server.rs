//! # HTTP Server
//!
//! Serves Prometheus metrics and the liveness/readiness probes.
//!
//! - `/metrics` - Prometheus text exposition of the operator registry
//! - `/healthz` - liveness, always OK while the process serves requests
//! - `/readyz` - readiness, OK once the controller is watching

use crate::observability::metrics::gather_metrics;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Shared state of the probe endpoints
#[derive(Debug, Default)]
pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
}

impl ServerState {
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::Relaxed);
    }

    pub fn ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed)
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

/// Bind and serve until `shutdown` fires; marks the state ready once bound
pub async fn start_server(
    port: u16,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {addr}"))?;
    info!("HTTP server listening on {}", addr);
    state.set_ready(true);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server terminated")?;
    Ok(())
}

/// Running HTTP server with a shutdown token of its own
///
/// Operator shutdown does not reach it; the server keeps answering health checks until
/// [`ServerHandle::stop`] is called after the controller has drained.
#[derive(Debug)]
pub struct ServerHandle {
    pub state: Arc<ServerState>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Report not ready, stop accepting connections and wait for the server task
    pub async fn stop(self) {
        self.state.set_ready(false);
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!("HTTP server task failed: {}", e);
        }
    }
}

/// Start the HTTP server in the background
pub fn spawn_server(port: u16, state: Arc<ServerState>) -> ServerHandle {
    let shutdown = CancellationToken::new();
    let server_state = state.clone();
    let server_shutdown = shutdown.clone();
    let task = tokio::spawn(async move {
        if let Err(e) = start_server(port, server_state, server_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });
    ServerHandle {
        state,
        shutdown,
        task,
    }
}

async fn metrics() -> Response {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<ServerState>>) -> StatusCode {
    if state.ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
