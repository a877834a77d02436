//! # Status Management
//!
//! Builds and writes the Istio status.
//!
//! Writes are skipped when nothing observable changed, so a steady-state
//! reconciliation does not emit watch events for its own status.

use crate::cluster::ClusterApi;
use crate::crd::{Condition, FailedWorkload, Istio, IstioStatus, State};
use crate::error::{ClusterApiError, DescribedError, OperatorError, WorkloadFailure};
use kube::ResourceExt;
use tracing::debug;

pub const READY_CONDITION: &str = "Ready";

/// Condition reason for a final state or error
fn reason(state: State, error: Option<&OperatorError>) -> &'static str {
    match (state, error) {
        (State::Ready, _) => "ReconcileSucceeded",
        (State::Processing, _) => "ReconcileProcessing",
        (State::Warning, _) => "SidecarsNotRestarted",
        (State::Error, Some(OperatorError::Discovery(_))) => "ClusterDiscoveryFailed",
        (State::Error, Some(OperatorError::Merge(_))) => "ConfigurationMergeFailed",
        (State::Error, Some(OperatorError::ResourceReconcile(_))) => "ResourcesReconcileFailed",
        (State::Error, Some(OperatorError::PlatformRestart(_))) => "PlatformRestartFailed",
        (State::Error, _) => "ReconcileFailed",
    }
}

fn condition_status(state: State) -> &'static str {
    match state {
        State::Ready => "True",
        State::Processing => "Unknown",
        State::Error | State::Warning => "False",
    }
}

/// Status for `state`, keeping the previous transition time when the condition did not flip
pub fn build_status(
    istio: &Istio,
    state: State,
    description: impl Into<String>,
    error: Option<&OperatorError>,
    failures: &[WorkloadFailure],
) -> IstioStatus {
    let description = description.into();
    let now = chrono::Utc::now().to_rfc3339();
    let status = condition_status(state);

    let last_transition_time = istio
        .status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.r#type == READY_CONDITION))
        .filter(|c| c.status == status)
        .and_then(|c| c.last_transition_time.clone())
        .unwrap_or_else(|| now.clone());

    IstioStatus {
        state: Some(state),
        description: Some(description.clone()),
        conditions: vec![Condition {
            r#type: READY_CONDITION.to_string(),
            status: status.to_string(),
            last_transition_time: Some(last_transition_time),
            reason: Some(reason(state, error).to_string()),
            message: Some(description),
        }],
        observed_generation: istio.metadata.generation,
        last_reconcile_time: Some(now),
        failed_workloads: failures
            .iter()
            .map(|f| FailedWorkload {
                kind: f.workload.kind.to_string(),
                namespace: f.workload.namespace.clone(),
                name: f.workload.name.clone(),
                message: f.error.clone(),
            })
            .collect(),
    }
}

pub fn processing_status(istio: &Istio) -> IstioStatus {
    build_status(
        istio,
        State::Processing,
        "Reconciling Istio resources and sidecars",
        None,
        &[],
    )
}

pub fn ready_status(istio: &Istio, restarted: usize) -> IstioStatus {
    let description = if restarted == 0 {
        "Istio is installed and all sidecars are up to date".to_string()
    } else {
        format!("Istio is installed; restarted {restarted} workload(s) with outdated sidecars")
    };
    build_status(istio, State::Ready, description, None, &[])
}

/// Warning or Error status for a failed reconciliation
pub fn failure_status(istio: &Istio, error: &DescribedError) -> IstioStatus {
    let state = if error.is_warning() {
        State::Warning
    } else {
        State::Error
    };
    build_status(
        istio,
        state,
        error.status_message(),
        Some(&error.source),
        error.failed_workloads(),
    )
}

/// Whether the status differs from the stored one in anything but timestamps
pub fn status_changed(current: Option<&IstioStatus>, desired: &IstioStatus) -> bool {
    let Some(current) = current else {
        return true;
    };
    current.state != desired.state
        || current.description != desired.description
        || current.observed_generation != desired.observed_generation
        || current.failed_workloads != desired.failed_workloads
}

/// Processing is only written when a new generation is picked up
pub fn needs_processing(istio: &Istio) -> bool {
    let Some(status) = istio.status.as_ref() else {
        return true;
    };
    status.state.is_none() || status.observed_generation != istio.metadata.generation
}

/// Write `status` unless it matches what is already stored
pub async fn update_status(
    api: &dyn ClusterApi,
    istio: &Istio,
    status: &IstioStatus,
) -> Result<(), ClusterApiError> {
    if !status_changed(istio.status.as_ref(), status) {
        debug!(
            "Skipping status update - state and description unchanged: state={:?}",
            status.state
        );
        return Ok(());
    }

    let namespace = istio.namespace().unwrap_or_default();
    api.patch_status(&namespace, &istio.name_any(), status)
        .await
}
