//! # Cancellable Cluster API
//!
//! Wraps a [`ClusterApi`] so that every call first checks a cancellation token and
//! is abandoned as soon as the token fires. Calls already issued to the API server
//! stay in effect; no compensating action is taken.

use super::{
    ClusterApi, DesiredResource, NodeInfo, OperationResult, WorkloadRef, WorkloadSelector,
};
use crate::crd::IstioStatus;
use crate::error::ClusterApiError;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// [`ClusterApi`] decorator that honors a [`CancellationToken`]
#[derive(Clone)]
pub struct CancellableClusterApi {
    inner: Arc<dyn ClusterApi>,
    token: CancellationToken,
}

impl std::fmt::Debug for CancellableClusterApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellableClusterApi")
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl CancellableClusterApi {
    pub fn new(inner: Arc<dyn ClusterApi>, token: CancellationToken) -> Self {
        Self { inner, token }
    }

    async fn guard<T>(
        &self,
        call: impl Future<Output = Result<T, ClusterApiError>> + Send,
    ) -> Result<T, ClusterApiError> {
        if self.token.is_cancelled() {
            return Err(ClusterApiError::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(ClusterApiError::Cancelled),
            result = call => result,
        }
    }
}

#[async_trait]
impl ClusterApi for CancellableClusterApi {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, ClusterApiError> {
        self.guard(self.inner.list_nodes()).await
    }

    async fn create_or_update(
        &self,
        desired: &DesiredResource,
        owner: &OwnerReference,
    ) -> Result<OperationResult, ClusterApiError> {
        self.guard(self.inner.create_or_update(desired, owner)).await
    }

    async fn list_workloads(
        &self,
        selector: &WorkloadSelector,
    ) -> Result<Vec<WorkloadRef>, ClusterApiError> {
        self.guard(self.inner.list_workloads(selector)).await
    }

    async fn restart_workload(&self, workload: &WorkloadRef) -> Result<(), ClusterApiError> {
        self.guard(self.inner.restart_workload(workload)).await
    }

    async fn should_use_nlb(&self) -> Result<bool, ClusterApiError> {
        self.guard(self.inner.should_use_nlb()).await
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &IstioStatus,
    ) -> Result<(), ClusterApiError> {
        self.guard(self.inner.patch_status(namespace, name, status))
            .await
    }
}
