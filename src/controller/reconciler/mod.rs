//! # Reconciler
//!
//! Reconciles Istio custom resources.
//!
//! ## Sub-modules
//!
//! - `pipeline` - discovery, configuration, managed resources and sidecar restart
//! - `status` - status construction and change-aware status writes
//!
//! The state written to the CR is the only failure channel: Ready and Warning requeue
//! on a fixed interval, Error goes through the error policy with per-resource backoff,
//! and a cancelled run writes nothing and requeues shortly.

pub mod pipeline;
pub mod status;

use crate::cluster::{CancellableClusterApi, ClusterApi};
use crate::config::SharedOperatorConfig;
use crate::constants::DEFAULT_CANCELLED_REQUEUE_SECS;
use crate::controller::backoff::FibonacciBackoff;
use crate::crd::Istio;
use crate::error::{DescribedError, OperatorError};
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Per-resource backoff tracking
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10), // 1 minute min, 10 minutes max
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

/// Reconciler context shared by every reconciliation
pub struct Reconciler {
    pub api: Arc<dyn ClusterApi>,
    pub config: SharedOperatorConfig,
    /// Cancelled on shutdown; in-flight reconciliations stop at the next cluster call
    pub shutdown: CancellationToken,
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        config: SharedOperatorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            api,
            config,
            shutdown,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    fn reset_backoff(&self, key: &str) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                states.remove(key);
            }
            Err(e) => warn!("Failed to lock backoff_states: {}", e),
        }
    }
}

pub fn resource_key(istio: &Istio) -> String {
    format!(
        "{}/{}",
        istio.namespace().unwrap_or_default(),
        istio.name_any()
    )
}

/// Reconcile an Istio custom resource
///
/// Entry point for the kube-runtime controller.
pub async fn reconcile(istio: Arc<Istio>, ctx: Arc<Reconciler>) -> Result<Action, DescribedError> {
    let span = info_span!(
        "istio.reconcile",
        resource.name = %istio.name_any(),
        resource.namespace = %istio.namespace().unwrap_or_default(),
        generation = istio.metadata.generation.unwrap_or_default(),
    );
    reconcile_inner(istio, ctx).instrument(span).await
}

async fn reconcile_inner(istio: Arc<Istio>, ctx: Arc<Reconciler>) -> Result<Action, DescribedError> {
    metrics::increment_reconciliations();
    let started = Instant::now();
    let key = resource_key(&istio);
    let api: Arc<dyn ClusterApi> = Arc::new(CancellableClusterApi::new(
        ctx.api.clone(),
        ctx.shutdown.child_token(),
    ));

    info!("Reconciling Istio");

    if status::needs_processing(&istio) {
        if let Err(e) =
            status::update_status(api.as_ref(), &istio, &status::processing_status(&istio)).await
        {
            if e.is_cancelled() {
                return Ok(cancelled());
            }
            return Err(DescribedError::new(
                OperatorError::Status(e),
                "Could not set Processing state",
            ));
        }
    }

    let result = pipeline::reconcile_istio(api.clone(), ctx.config.clone(), &istio).await;
    metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());

    match result {
        Ok(restarted) => {
            write_final_status(api.as_ref(), &istio, &status::ready_status(&istio, restarted))
                .await?;
            ctx.reset_backoff(&key);
            info!(restarted = restarted, "Istio is Ready");
            metrics::increment_requeues_total("ready");
            Ok(Action::requeue(Duration::from_secs(
                ctx.config.ready_requeue_secs,
            )))
        }
        Err(e) if e.is_cancelled() => {
            info!("Reconciliation cancelled: {}", e);
            Ok(cancelled())
        }
        Err(e) if e.is_warning() => {
            warn!("Istio is in Warning state: {}", e);
            write_final_status(api.as_ref(), &istio, &status::failure_status(&istio, &e)).await?;
            ctx.reset_backoff(&key);
            metrics::increment_requeues_total("warning");
            Ok(Action::requeue(Duration::from_secs(
                ctx.config.warning_requeue_secs,
            )))
        }
        Err(e) => {
            error!("Istio is in Error state: {}", e);
            if let Err(status_error) =
                status::update_status(api.as_ref(), &istio, &status::failure_status(&istio, &e))
                    .await
            {
                error!("Failed to write Error state: {}", status_error);
            }
            Err(e)
        }
    }
}

async fn write_final_status(
    api: &dyn ClusterApi,
    istio: &Istio,
    status: &crate::crd::IstioStatus,
) -> Result<(), DescribedError> {
    status::update_status(api, istio, status)
        .await
        .map_err(|e| {
            if e.is_cancelled() {
                DescribedError::new(e, "Status update cancelled")
            } else {
                DescribedError::new(OperatorError::Status(e), "Could not update Istio status")
            }
        })
}

fn cancelled() -> Action {
    metrics::increment_requeues_total("cancelled");
    Action::requeue(Duration::from_secs(DEFAULT_CANCELLED_REQUEUE_SECS))
}
