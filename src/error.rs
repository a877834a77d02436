//! # Error Types
//!
//! Error taxonomy for the operator.
//!
//! Every failure is data: it ends up on the Istio custom resource status and is
//! never program-fatal. Cluster API failures are wrapped by the stage that hit them
//! so the status message says what was being attempted.

use crate::cluster::WorkloadRef;
use crate::restart::{InvalidTransition, RestartState};
use thiserror::Error;

/// Failure of a single call against the cluster API
#[derive(Debug, Error)]
pub enum ClusterApiError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("failed to serialize resource: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{workload} cannot be restarted: {reason}")]
    NotRestartable { workload: WorkloadRef, reason: String },
    #[error("{0} has no uid and cannot own resources")]
    MissingOwner(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

impl ClusterApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClusterApiError::Cancelled)
    }
}

/// Cluster inspection failed (transport or permission)
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to list cluster nodes: {0}")]
    ListNodes(#[source] ClusterApiError),
    #[error("failed to determine load balancer mode: {0}")]
    LoadBalancerMode(#[source] ClusterApiError),
}

impl DiscoveryError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            DiscoveryError::ListNodes(e) | DiscoveryError::LoadBalancerMode(e) => e.is_cancelled(),
        }
    }
}

/// Malformed template or type conflict during override merging
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to parse configuration template: {0}")]
    InvalidTemplate(#[from] serde_yaml::Error),
    #[error("failed to render configuration document: {0}")]
    Render(#[source] serde_yaml::Error),
    #[error("configuration template must be a mapping at the top level, got {0}")]
    NotAMapping(&'static str),
    #[error("cannot merge {override_kind} into {base_kind} at '{path}'")]
    TypeConflict {
        path: String,
        base_kind: &'static str,
        override_kind: &'static str,
    },
}

/// A specific managed resource failed to apply
#[derive(Debug, Error)]
#[error("could not reconcile Istio resource {resource}: {source}")]
pub struct ResourceReconcileError {
    pub resource: String,
    #[source]
    pub source: ClusterApiError,
}

/// Platform workload restart failed; customer workloads were not touched
#[derive(Debug, Error)]
pub enum PlatformRestartError {
    #[error("failed to list platform workloads: {0}")]
    List(#[source] ClusterApiError),
    #[error("failed to restart platform workload {workload}: {source}")]
    Restart {
        workload: WorkloadRef,
        #[source]
        source: ClusterApiError,
    },
}

impl PlatformRestartError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            PlatformRestartError::List(e) | PlatformRestartError::Restart { source: e, .. } => {
                e.is_cancelled()
            }
        }
    }
}

/// A customer workload that could not be restarted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadFailure {
    pub workload: WorkloadRef,
    pub error: String,
}

/// Some customer workloads could not be restarted; the mesh itself is healthy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerRestartPartialFailure {
    /// Failed workloads in the order they were attempted
    pub failures: Vec<WorkloadFailure>,
    /// Set when the customer workloads could not be enumerated at all
    pub listing_error: Option<String>,
}

impl CustomerRestartPartialFailure {
    pub fn failed_workloads(&self) -> Vec<&WorkloadRef> {
        self.failures.iter().map(|f| &f.workload).collect()
    }
}

impl std::fmt::Display for CustomerRestartPartialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(listing_error) = &self.listing_error {
            return write!(f, "failed to list customer workloads: {listing_error}");
        }
        let names: Vec<String> = self
            .failed_workloads()
            .iter()
            .map(ToString::to_string)
            .collect();
        write!(
            f,
            "{} customer workload(s) could not be restarted: {}",
            names.len(),
            names.join(", ")
        )
    }
}

impl std::error::Error for CustomerRestartPartialFailure {}

/// The sidecar restart did not follow the rollout state machine
#[derive(Debug, Error)]
pub enum RestartFlowError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("sidecar restart ended in non-terminal state {0}")]
    Incomplete(RestartState),
}

/// Any error that ends a reconciliation before Ready
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    ResourceReconcile(#[from] ResourceReconcileError),
    #[error(transparent)]
    PlatformRestart(#[from] PlatformRestartError),
    #[error(transparent)]
    CustomerRestart(#[from] CustomerRestartPartialFailure),
    #[error(transparent)]
    RestartFlow(#[from] RestartFlowError),
    #[error("failed to update Istio status: {0}")]
    Status(#[source] ClusterApiError),
    #[error(transparent)]
    ClusterApi(#[from] ClusterApiError),
}

impl OperatorError {
    /// Whether the error only reports that the run was cancelled
    pub fn is_cancelled(&self) -> bool {
        match self {
            OperatorError::Discovery(e) => e.is_cancelled(),
            OperatorError::ResourceReconcile(e) => e.source.is_cancelled(),
            OperatorError::PlatformRestart(e) => e.is_cancelled(),
            OperatorError::Status(e)
            | OperatorError::ClusterApi(e) => e.is_cancelled(),
            OperatorError::Merge(_)
            | OperatorError::CustomerRestart(_)
            | OperatorError::RestartFlow(_) => false,
        }
    }
}

/// Severity of a [`DescribedError`], mapped onto the CR state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Error,
    Warning,
}

/// Error with a human readable description that is surfaced on the CR status
#[derive(Debug, Error)]
#[error("{description}: {source}")]
pub struct DescribedError {
    pub description: String,
    pub level: ErrorLevel,
    pub source: OperatorError,
}

impl DescribedError {
    pub fn new(source: impl Into<OperatorError>, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            level: ErrorLevel::Error,
            source: source.into(),
        }
    }

    pub fn warning(source: impl Into<OperatorError>, description: impl Into<String>) -> Self {
        Self {
            level: ErrorLevel::Warning,
            ..Self::new(source, description)
        }
    }

    pub fn cancelled(description: impl Into<String>) -> Self {
        Self::new(ClusterApiError::Cancelled, description)
    }

    pub fn is_warning(&self) -> bool {
        self.level == ErrorLevel::Warning
    }

    pub fn is_cancelled(&self) -> bool {
        self.source.is_cancelled()
    }

    /// Customer workloads left on the old proxy, if this error reports them
    pub fn failed_workloads(&self) -> &[WorkloadFailure] {
        match &self.source {
            OperatorError::CustomerRestart(partial) => &partial.failures,
            _ => &[],
        }
    }

    /// Message written to the status description
    pub fn status_message(&self) -> String {
        self.to_string()
    }
}
