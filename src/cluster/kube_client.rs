//! # Kubernetes Cluster API
//!
//! [`ClusterApi`] implementation backed by `kube::Client`.

use super::workloads::{direct_owner, pod_needs_restart, replica_set_workload, OwnerLookup};
use super::{
    ClusterApi, DesiredResource, NamespaceScope, NodeInfo, OperationResult, WorkloadKind,
    WorkloadRef, WorkloadSelector,
};
use crate::constants::{
    ELB_DEPRECATED_CONFIGMAP, FIELD_MANAGER, POD_LIST_PAGE_SIZE, RESTARTED_AT_ANNOTATION,
};
use crate::crd::{Istio, IstioStatus};
use crate::error::ClusterApiError;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{
    Api, ApiResource, DynamicObject, EvictParams, ListParams, Patch, PatchParams, PostParams,
};
use kube::Client;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;
use tracing::{debug, info};

/// Cluster API backed by a Kubernetes client
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
    istio_namespace: String,
}

impl Debug for KubeClusterApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterApi")
            .field("istio_namespace", &self.istio_namespace)
            .finish_non_exhaustive()
    }
}

impl KubeClusterApi {
    pub fn new(client: Client, istio_namespace: impl Into<String>) -> Self {
        Self {
            client,
            istio_namespace: istio_namespace.into(),
        }
    }

    async fn list_pods(&self, scope: &NamespaceScope) -> Result<Vec<Pod>, kube::Error> {
        match scope {
            NamespaceScope::Only(namespaces) => {
                let mut pods = Vec::new();
                for namespace in namespaces {
                    let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
                    pods.extend(list_all_pages(&api, ListParams::default()).await?);
                }
                Ok(pods)
            }
            NamespaceScope::AllExcept(_) => {
                let api: Api<Pod> = Api::all(self.client.clone());
                let pods = list_all_pages(&api, ListParams::default()).await?;
                Ok(pods
                    .into_iter()
                    .filter(|pod| scope.contains(pod.metadata.namespace.as_deref().unwrap_or("")))
                    .collect())
            }
        }
    }

    async fn patch_restarted_at<K>(&self, workload: &WorkloadRef) -> Result<(), ClusterApiError>
    where
        K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &workload.namespace);
        let patch = serde_json::json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": {
                            RESTARTED_AT_ANNOTATION: chrono::Utc::now().to_rfc3339()
                        }
                    }
                }
            }
        });
        api.patch(
            &workload.name,
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }

    /// A ReplicaSet has no rollout of its own; its pods are evicted and recreated
    async fn evict_replica_set_pods(&self, workload: &WorkloadRef) -> Result<(), ClusterApiError> {
        let replica_sets: Api<ReplicaSet> =
            Api::namespaced(self.client.clone(), &workload.namespace);
        let Some(replica_set) = replica_sets.get_opt(&workload.name).await? else {
            debug!("ReplicaSet {} is gone, nothing to restart", workload);
            return Ok(());
        };
        let uid = replica_set.metadata.uid.unwrap_or_default();
        let selector = replica_set
            .spec
            .and_then(|spec| spec.selector.match_labels)
            .unwrap_or_default()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &workload.namespace);
        let owned = list_all_pages(&pods, ListParams::default().labels(&selector))
            .await?
            .into_iter()
            .filter(|pod| {
                pod.metadata
                    .owner_references
                    .iter()
                    .flatten()
                    .any(|owner| owner.uid == uid)
            });
        for pod in owned {
            let name = pod.metadata.name.unwrap_or_default();
            pods.evict(&name, &EvictParams::default()).await?;
            debug!("Evicted pod {}/{} of {}", workload.namespace, name, workload);
        }
        Ok(())
    }
}

async fn list_all_pages<K>(api: &Api<K>, params: ListParams) -> Result<Vec<K>, kube::Error>
where
    K: Clone + DeserializeOwned + Debug,
{
    let mut items = Vec::new();
    let mut params = params.limit(POD_LIST_PAGE_SIZE);
    loop {
        let page = api.list(&params).await?;
        items.extend(page.items);
        match page.metadata.continue_ {
            Some(token) if !token.is_empty() => params = params.continue_token(&token),
            _ => break,
        }
    }
    Ok(items)
}

fn node_info(node: Node) -> NodeInfo {
    let status = node.status.unwrap_or_default();
    let allocatable = status.allocatable.unwrap_or_default();
    let system = status.node_info.unwrap_or_default();
    NodeInfo {
        name: node.metadata.name.unwrap_or_default(),
        allocatable_cpu: allocatable.get("cpu").map(|q| q.0.clone()),
        allocatable_memory: allocatable.get("memory").map(|q| q.0.clone()),
        kubelet_version: system.kubelet_version,
        os_image: system.os_image,
        provider_id: node.spec.and_then(|s| s.provider_id).unwrap_or_default(),
    }
}

/// Whether every desired entry is present with the same value
fn contains_all(actual: Option<&BTreeMap<String, String>>, desired: &BTreeMap<String, String>) -> bool {
    desired
        .iter()
        .all(|(k, v)| actual.and_then(|a| a.get(k)) == Some(v))
}

fn has_owner(object: &DynamicObject, owner: &OwnerReference) -> bool {
    object
        .metadata
        .owner_references
        .iter()
        .flatten()
        .any(|o| o.uid == owner.uid)
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>, ClusterApiError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = list_all_pages(&api, ListParams::default()).await?;
        Ok(nodes.into_iter().map(node_info).collect())
    }

    async fn create_or_update(
        &self,
        desired: &DesiredResource,
        owner: &OwnerReference,
    ) -> Result<OperationResult, ClusterApiError> {
        let resource = ApiResource::from_gvk_with_plural(&desired.gvk, &desired.plural);
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &desired.namespace, &resource);

        let Some(mut existing) = api.get_opt(&desired.name).await? else {
            let mut object = DynamicObject::new(&desired.name, &resource)
                .within(&desired.namespace)
                .data(serde_json::json!({ "spec": desired.spec }));
            object.metadata.labels = Some(desired.labels.clone());
            object.metadata.annotations = Some(desired.annotations.clone());
            object.metadata.owner_references = Some(vec![owner.clone()]);
            api.create(&PostParams::default(), &object).await?;
            return Ok(OperationResult::Created);
        };

        let spec_matches = existing.data.get("spec") == Some(&desired.spec);
        let labels_match = contains_all(existing.metadata.labels.as_ref(), &desired.labels);
        let annotations_match =
            contains_all(existing.metadata.annotations.as_ref(), &desired.annotations);
        if spec_matches && labels_match && annotations_match && has_owner(&existing, owner) {
            return Ok(OperationResult::Unchanged);
        }

        existing.data["spec"] = desired.spec.clone();
        existing
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(desired.labels.clone());
        existing
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(desired.annotations.clone());
        if !has_owner(&existing, owner) {
            existing
                .metadata
                .owner_references
                .get_or_insert_with(Vec::new)
                .push(owner.clone());
        }
        api.replace(&desired.name, &PostParams::default(), &existing)
            .await?;
        Ok(OperationResult::Updated)
    }

    async fn list_workloads(
        &self,
        selector: &WorkloadSelector,
    ) -> Result<Vec<WorkloadRef>, ClusterApiError> {
        let pods = self.list_pods(&selector.scope).await?;
        let mut workloads = BTreeSet::new();
        let mut replica_set_owners: HashMap<(String, String), WorkloadRef> = HashMap::new();

        for pod in pods
            .iter()
            .filter(|pod| pod_needs_restart(pod, &selector.expected_proxy_image))
        {
            let workload = match direct_owner(pod) {
                OwnerLookup::Resolved(workload) => workload,
                OwnerLookup::ReplicaSet { namespace, name } => {
                    let key = (namespace, name);
                    if let Some(workload) = replica_set_owners.get(&key) {
                        workload.clone()
                    } else {
                        let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), &key.0);
                        let owners = api
                            .get_opt(&key.1)
                            .await?
                            .and_then(|rs| rs.metadata.owner_references);
                        let workload = replica_set_workload(&key.0, &key.1, owners.as_deref());
                        replica_set_owners.insert(key, workload.clone());
                        workload
                    }
                }
            };
            workloads.insert(workload);
        }

        info!(
            "Found {} workload(s) with outdated sidecars across {} pod(s)",
            workloads.len(),
            pods.len()
        );
        Ok(workloads.into_iter().collect())
    }

    async fn restart_workload(&self, workload: &WorkloadRef) -> Result<(), ClusterApiError> {
        match workload.kind {
            WorkloadKind::Deployment => self.patch_restarted_at::<Deployment>(workload).await,
            WorkloadKind::DaemonSet => self.patch_restarted_at::<DaemonSet>(workload).await,
            WorkloadKind::StatefulSet => self.patch_restarted_at::<StatefulSet>(workload).await,
            WorkloadKind::ReplicaSet => self.evict_replica_set_pods(workload).await,
            WorkloadKind::Pod => Err(ClusterApiError::NotRestartable {
                workload: workload.clone(),
                reason: "pod is not managed by a Deployment, DaemonSet, StatefulSet or ReplicaSet"
                    .to_string(),
            }),
        }
    }

    async fn should_use_nlb(&self) -> Result<bool, ClusterApiError> {
        // NLB is the default on AWS; the marker ConfigMap keeps legacy clusters on ELB
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.istio_namespace);
        let marker = api.get_opt(ELB_DEPRECATED_CONFIGMAP).await?;
        Ok(marker.is_none())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &IstioStatus,
    ) -> Result<(), ClusterApiError> {
        let api: Api<Istio> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "status": serde_json::to_value(status)? });

        match api
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                // Resource was deleted during reconciliation - this is expected and not an error
                debug!(
                    "Istio {}/{} was deleted during reconciliation, skipping status update",
                    namespace, name
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeSpec, NodeStatus, NodeSystemInfo};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_node_info_extracts_classification_fields() {
        let node = Node {
            metadata: ObjectMeta {
                name: Some("worker-1".to_string()),
                ..Default::default()
            },
            spec: Some(NodeSpec {
                provider_id: Some("aws:///eu-central-1a/i-0abc".to_string()),
                ..Default::default()
            }),
            status: Some(NodeStatus {
                allocatable: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity("3920m".to_string())),
                    ("memory".to_string(), Quantity("15Gi".to_string())),
                ])),
                node_info: Some(NodeSystemInfo {
                    kubelet_version: "v1.30.2".to_string(),
                    os_image: "Garden Linux 1443.10".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        };

        let info = node_info(node);
        assert_eq!(info.name, "worker-1");
        assert_eq!(info.allocatable_cpu.as_deref(), Some("3920m"));
        assert_eq!(info.allocatable_memory.as_deref(), Some("15Gi"));
        assert_eq!(info.kubelet_version, "v1.30.2");
        assert_eq!(info.os_image, "Garden Linux 1443.10");
        assert_eq!(info.provider_id, "aws:///eu-central-1a/i-0abc");
    }

    #[test]
    fn test_node_without_status_has_empty_fields() {
        let info = node_info(Node::default());
        assert_eq!(info, NodeInfo::default());
    }

    #[test]
    fn test_contains_all_requires_matching_values() {
        let desired = BTreeMap::from([("kyma-project.io/module".to_string(), "istio".to_string())]);
        let mut actual = desired.clone();
        actual.insert("extra".to_string(), "kept".to_string());
        assert!(contains_all(Some(&actual), &desired));

        actual.insert("kyma-project.io/module".to_string(), "other".to_string());
        assert!(!contains_all(Some(&actual), &desired));
        assert!(!contains_all(None, &desired));
    }
}
