//! # Error Policy
//!
//! Requeue policy for failed reconciliations.

use crate::constants;
use crate::controller::reconciler::{resource_key, BackoffState, Reconciler};
use crate::crd::Istio;
use crate::error::DescribedError;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource so one failing Istio CR does not delay others.
/// Cancelled runs are requeued shortly without counting as an error.
pub fn error_policy(istio: Arc<Istio>, error: &DescribedError, ctx: Arc<Reconciler>) -> Action {
    if error.is_cancelled() {
        info!("Reconciliation cancelled, requeueing: {}", error);
        observability::metrics::increment_requeues_total("cancelled");
        return Action::requeue(Duration::from_secs(
            constants::DEFAULT_CANCELLED_REQUEUE_SECS,
        ));
    }

    let key = resource_key(&istio);
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        resource = %key,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {}", key, error);
    observability::metrics::increment_reconciliation_errors();

    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(key.clone()).or_insert_with(BackoffState::new);
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!(
                "Failed to lock backoff_states: {}, using default backoff",
                e
            );
            (constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, 0)
        }
    };

    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {})",
        backoff_seconds, error_count
    );
    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterApi;
    use crate::config::OperatorConfig;
    use crate::crd::IstioSpec;
    use crate::error::{ClusterApiError, DiscoveryError};
    use tokio_util::sync::CancellationToken;

    fn context() -> Arc<Reconciler> {
        Arc::new(Reconciler::new(
            Arc::new(MockClusterApi::new()),
            Arc::new(OperatorConfig::default()),
            CancellationToken::new(),
        ))
    }

    fn istio() -> Arc<Istio> {
        let mut istio = Istio::new("default", IstioSpec::default());
        istio.metadata.namespace = Some("kyma-system".to_string());
        Arc::new(istio)
    }

    #[test]
    fn test_backoff_grows_per_resource() {
        let ctx = context();
        let error = DescribedError::new(
            DiscoveryError::ListNodes(ClusterApiError::Other("forbidden".to_string())),
            "Could not evaluate cluster profile",
        );

        let actions: Vec<Action> = (0..4)
            .map(|_| error_policy(istio(), &error, ctx.clone()))
            .collect();
        assert_eq!(actions[0], Action::requeue(Duration::from_secs(60)));
        assert_eq!(actions[1], Action::requeue(Duration::from_secs(60)));
        assert_eq!(actions[2], Action::requeue(Duration::from_secs(120)));
        assert_eq!(actions[3], Action::requeue(Duration::from_secs(180)));

        let states = ctx.backoff_states.lock().unwrap();
        assert_eq!(states.get("kyma-system/default").unwrap().error_count, 4);
    }

    #[test]
    fn test_cancellation_is_not_an_error() {
        let ctx = context();
        let error = DescribedError::cancelled("Sidecar restart cancelled");
        let action = error_policy(istio(), &error, ctx.clone());
        assert_eq!(
            action,
            Action::requeue(Duration::from_secs(
                constants::DEFAULT_CANCELLED_REQUEUE_SECS
            ))
        );
        assert!(ctx.backoff_states.lock().unwrap().is_empty());
    }
}
