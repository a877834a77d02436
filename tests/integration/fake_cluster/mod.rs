//! In-memory cluster for integration tests.
//!
//! Implements `ClusterApi` over plain collections, records every call and lets tests
//! inject failures per resource or workload.

#![allow(dead_code, reason = "each test binary uses a different subset of helpers")]

use async_trait::async_trait;
use istio_mesh_operator::cluster::{
    ClusterApi, DesiredResource, NodeInfo, OperationResult, WorkloadKind, WorkloadRef,
    WorkloadSelector,
};
use istio_mesh_operator::error::ClusterApiError;
use istio_mesh_operator::{Istio, IstioSpec, IstioStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredResource {
    pub spec: serde_json::Value,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub owners: Vec<OwnerReference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListNodes,
    CreateOrUpdate(String),
    ListWorkloads,
    RestartWorkload(WorkloadRef),
    ShouldUseNlb,
    PatchStatus,
}

#[derive(Debug, Default)]
struct State {
    nodes: Vec<NodeInfo>,
    resources: BTreeMap<(String, String, String), StoredResource>,
    workloads: Vec<WorkloadRef>,
    use_nlb: bool,
    failing_resources: HashSet<String>,
    failing_workloads: HashSet<WorkloadRef>,
    fail_list_nodes: bool,
    cancel_after_restarts: Option<(usize, CancellationToken)>,
    calls: Vec<Call>,
    restarted: Vec<WorkloadRef>,
    statuses: Vec<IstioStatus>,
}

#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake cluster state poisoned")
    }

    pub fn with_nodes(self, nodes: Vec<NodeInfo>) -> Self {
        self.state().nodes = nodes;
        self
    }

    pub fn with_workloads(self, workloads: Vec<WorkloadRef>) -> Self {
        self.state().workloads.extend(workloads);
        self
    }

    pub fn with_nlb(self, use_nlb: bool) -> Self {
        self.state().use_nlb = use_nlb;
        self
    }

    pub fn fail_resource(&self, name: &str) {
        self.state().failing_resources.insert(name.to_string());
    }

    pub fn fail_restart(&self, workload: &WorkloadRef) {
        self.state().failing_workloads.insert(workload.clone());
    }

    pub fn fail_list_nodes(&self) {
        self.state().fail_list_nodes = true;
    }

    /// Cancel `token` once `count` restarts have succeeded; the interrupted call fails
    pub fn cancel_after_restarts(&self, count: usize, token: CancellationToken) {
        self.state().cancel_after_restarts = Some((count, token));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn restart_attempts(&self) -> Vec<WorkloadRef> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::RestartWorkload(workload) => Some(workload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn restarted(&self) -> Vec<WorkloadRef> {
        self.state().restarted.clone()
    }

    pub fn resource(&self, kind: &str, namespace: &str, name: &str) -> Option<StoredResource> {
        self.state()
            .resources
            .get(&(kind.to_string(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn resource_count(&self) -> usize {
        self.state().resources.len()
    }

    /// Simulate a manual edit of a managed resource
    pub fn edit_spec(&self, kind: &str, namespace: &str, name: &str, spec: serde_json::Value) {
        if let Some(resource) = self.state().resources.get_mut(&(
            kind.to_string(),
            namespace.to_string(),
            name.to_string(),
        )) {
            resource.spec = spec;
        }
    }

    pub fn statuses(&self) -> Vec<IstioStatus> {
        self.state().statuses.clone()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, ClusterApiError> {
        let mut state = self.state();
        state.calls.push(Call::ListNodes);
        if state.fail_list_nodes {
            return Err(ClusterApiError::Other("nodes is forbidden".to_string()));
        }
        Ok(state.nodes.clone())
    }

    async fn create_or_update(
        &self,
        desired: &DesiredResource,
        owner: &OwnerReference,
    ) -> Result<OperationResult, ClusterApiError> {
        let mut state = self.state();
        state.calls.push(Call::CreateOrUpdate(desired.name.clone()));
        if state.failing_resources.contains(&desired.name) {
            return Err(ClusterApiError::Other(format!(
                "admission webhook denied {}",
                desired.name
            )));
        }

        let key = (
            desired.gvk.kind.clone(),
            desired.namespace.clone(),
            desired.name.clone(),
        );
        let stored = StoredResource {
            spec: desired.spec.clone(),
            labels: desired.labels.clone(),
            annotations: desired.annotations.clone(),
            owners: vec![owner.clone()],
        };
        let result = match state.resources.get(&key) {
            None => OperationResult::Created,
            Some(existing) if *existing == stored => OperationResult::Unchanged,
            Some(_) => OperationResult::Updated,
        };
        state.resources.insert(key, stored);
        Ok(result)
    }

    async fn list_workloads(
        &self,
        selector: &WorkloadSelector,
    ) -> Result<Vec<WorkloadRef>, ClusterApiError> {
        let mut state = self.state();
        state.calls.push(Call::ListWorkloads);
        let mut selected: Vec<WorkloadRef> = state
            .workloads
            .iter()
            .filter(|w| selector.scope.contains(&w.namespace))
            .cloned()
            .collect();
        selected.sort();
        Ok(selected)
    }

    async fn restart_workload(&self, workload: &WorkloadRef) -> Result<(), ClusterApiError> {
        let mut state = self.state();
        state.calls.push(Call::RestartWorkload(workload.clone()));
        if let Some((count, token)) = &state.cancel_after_restarts {
            if state.restarted.len() >= *count {
                token.cancel();
                return Err(ClusterApiError::Cancelled);
            }
        }
        if workload.kind == WorkloadKind::Pod {
            return Err(ClusterApiError::NotRestartable {
                workload: workload.clone(),
                reason: "pod has no restartable owner".to_string(),
            });
        }
        if state.failing_workloads.contains(workload) {
            return Err(ClusterApiError::Other("restart forbidden".to_string()));
        }
        state.restarted.push(workload.clone());
        Ok(())
    }

    async fn should_use_nlb(&self) -> Result<bool, ClusterApiError> {
        let mut state = self.state();
        state.calls.push(Call::ShouldUseNlb);
        Ok(state.use_nlb)
    }

    async fn patch_status(
        &self,
        _namespace: &str,
        _name: &str,
        status: &IstioStatus,
    ) -> Result<(), ClusterApiError> {
        let mut state = self.state();
        state.calls.push(Call::PatchStatus);
        state.statuses.push(status.clone());
        Ok(())
    }
}

pub fn node(cpu: &str, memory: &str) -> NodeInfo {
    NodeInfo {
        name: format!("node-{cpu}-{memory}"),
        allocatable_cpu: Some(cpu.to_string()),
        allocatable_memory: Some(memory.to_string()),
        kubelet_version: "v1.30.4".to_string(),
        os_image: "Ubuntu 22.04.4 LTS".to_string(),
        provider_id: String::new(),
    }
}

pub fn aws_node() -> NodeInfo {
    NodeInfo {
        provider_id: "aws:///eu-central-1a/i-0f1e2d3c4b5a69788".to_string(),
        ..node("8", "32Gi")
    }
}

pub fn openstack_node() -> NodeInfo {
    NodeInfo {
        provider_id: "openstack:///9b1f2c3d-aaaa-bbbb-cccc-0123456789ab".to_string(),
        ..node("8", "32Gi")
    }
}

pub fn deployments(namespace: &str, count: usize) -> Vec<WorkloadRef> {
    (0..count)
        .map(|i| WorkloadRef::new(WorkloadKind::Deployment, namespace, format!("app-{i:02}")))
        .collect()
}

pub fn istio() -> Istio {
    let mut istio = Istio::new("default", IstioSpec::default());
    istio.metadata.namespace = Some("kyma-system".to_string());
    istio.metadata.uid = Some("6f0c7a2e-5d1b-4c3e-9a8f-1b2c3d4e5f60".to_string());
    istio.metadata.generation = Some(1);
    istio
}

pub fn owner() -> OwnerReference {
    OwnerReference {
        api_version: "operator.kyma-project.io/v1alpha2".to_string(),
        kind: "Istio".to_string(),
        name: "default".to_string(),
        uid: "6f0c7a2e-5d1b-4c3e-9a8f-1b2c3d4e5f60".to_string(),
        ..Default::default()
    }
}
