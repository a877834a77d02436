//! # Cluster API
//!
//! The narrow set of cluster capabilities the operator core consumes.
//!
//! - `kube_client` - `ClusterApi` backed by a real `kube::Client`
//! - `cancellable` - decorator that honors a cancellation signal at every call boundary
//! - `workloads` - pod inspection helpers used to find outdated sidecars
//!
//! Everything above this module talks to the cluster only through [`ClusterApi`],
//! which keeps discovery, resource reconciliation and the restart rollout testable
//! without a live cluster.

mod cancellable;
mod kube_client;
pub mod workloads;

pub use cancellable::CancellableClusterApi;
pub use kube_client::KubeClusterApi;

use crate::crd::IstioStatus;
use crate::error::ClusterApiError;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::GroupVersionKind;
use std::collections::BTreeMap;
use std::fmt;

#[cfg(test)]
use mockall::automock;

/// Node inventory entry used for cluster classification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    /// Allocatable CPU as a Kubernetes quantity string (e.g. "3920m")
    pub allocatable_cpu: Option<String>,
    /// Allocatable memory as a Kubernetes quantity string (e.g. "15Gi")
    pub allocatable_memory: Option<String>,
    pub kubelet_version: String,
    pub os_image: String,
    pub provider_id: String,
}

/// Kind of a restartable workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
    StatefulSet,
    /// ReplicaSet that is not owned by a Deployment
    ReplicaSet,
    /// Pod without a restartable owner
    Pod,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            WorkloadKind::Deployment => "Deployment",
            WorkloadKind::DaemonSet => "DaemonSet",
            WorkloadKind::StatefulSet => "StatefulSet",
            WorkloadKind::ReplicaSet => "ReplicaSet",
            WorkloadKind::Pod => "Pod",
        };
        f.write_str(kind)
    }
}

/// Identifier of a workload whose pods carry a sidecar
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkloadRef {
    pub kind: WorkloadKind,
    pub namespace: String,
    pub name: String,
}

impl WorkloadRef {
    pub fn new(kind: WorkloadKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Which namespaces a workload listing covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceScope {
    /// Only the given namespaces
    Only(Vec<String>),
    /// Every namespace except the given ones
    AllExcept(Vec<String>),
}

impl NamespaceScope {
    pub fn contains(&self, namespace: &str) -> bool {
        match self {
            NamespaceScope::Only(namespaces) => namespaces.iter().any(|ns| ns == namespace),
            NamespaceScope::AllExcept(namespaces) => !namespaces.iter().any(|ns| ns == namespace),
        }
    }
}

/// Selects sidecar-injected workloads whose proxy is outdated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSelector {
    pub scope: NamespaceScope,
    /// Image every sidecar should run; workloads already on it are not selected
    pub expected_proxy_image: String,
}

/// Desired state of a managed mesh resource
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredResource {
    pub gvk: GroupVersionKind,
    pub plural: String,
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub spec: serde_json::Value,
}

/// Result of a create-or-update call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

impl OperationResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationResult::Created => "created",
            OperationResult::Updated => "updated",
            OperationResult::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster capabilities consumed by the operator core
///
/// Implementations must be idempotent where noted; the core retries by running
/// the whole reconciliation again, never by repeating a single call.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List every node in the cluster, in listing order
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, ClusterApiError>;

    /// Create the resource if absent, update it if it drifted, otherwise leave it alone
    ///
    /// The owner reference is stamped on the resource so that deleting the owner
    /// garbage-collects it.
    async fn create_or_update(
        &self,
        desired: &DesiredResource,
        owner: &OwnerReference,
    ) -> Result<OperationResult, ClusterApiError>;

    /// List workloads matching the selector, deduplicated and sorted
    async fn list_workloads(
        &self,
        selector: &WorkloadSelector,
    ) -> Result<Vec<WorkloadRef>, ClusterApiError>;

    /// Trigger a rolling replacement of the workload's pods
    async fn restart_workload(&self, workload: &WorkloadRef) -> Result<(), ClusterApiError>;

    /// Whether the ingress gateway runs behind a network load balancer
    async fn should_use_nlb(&self) -> Result<bool, ClusterApiError>;

    /// Write the status of the Istio custom resource
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &IstioStatus,
    ) -> Result<(), ClusterApiError>;
}
