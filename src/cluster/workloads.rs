//! # Workload Inspection
//!
//! Decides which pods carry an outdated sidecar and which workload owns them.

use super::{WorkloadKind, WorkloadRef};
use crate::constants::{SIDECAR_CONTAINER_NAME, SIDECAR_INJECT_ANNOTATION};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

/// Whether the pod runs a sidecar that must be replaced to pick up `expected_image`
///
/// Terminating pods, pods that are not running and pods that opted out of injection
/// are skipped: restarting them cannot change their proxy.
pub fn pod_needs_restart(pod: &Pod, expected_image: &str) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }

    let running = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == "Running");
    if !running {
        return false;
    }

    let opted_out = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(SIDECAR_INJECT_ANNOTATION))
        .is_some_and(|v| v.eq_ignore_ascii_case("false"));
    if opted_out {
        return false;
    }

    sidecar_image(pod).is_some_and(|image| image != expected_image)
}

/// Image of the injected proxy container, if the pod has one
pub fn sidecar_image(pod: &Pod) -> Option<&str> {
    let spec = pod.spec.as_ref()?;
    spec.containers
        .iter()
        .chain(spec.init_containers.iter().flatten())
        .find(|c| c.name == SIDECAR_CONTAINER_NAME)
        .and_then(|c| c.image.as_deref())
}

/// First step of owner resolution for a pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerLookup {
    /// Owner is known without further API calls
    Resolved(WorkloadRef),
    /// Pod belongs to a ReplicaSet whose own owner must be looked up
    ReplicaSet { namespace: String, name: String },
}

/// Resolve the controlling owner of a pod as far as the pod metadata allows
pub fn direct_owner(pod: &Pod) -> OwnerLookup {
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    let pod_name = pod.metadata.name.clone().unwrap_or_default();

    let Some(owner) = controller_owner(pod.metadata.owner_references.as_deref()) else {
        return OwnerLookup::Resolved(WorkloadRef::new(WorkloadKind::Pod, namespace, pod_name));
    };

    match owner.kind.as_str() {
        "ReplicaSet" => OwnerLookup::ReplicaSet {
            namespace,
            name: owner.name.clone(),
        },
        "DaemonSet" => OwnerLookup::Resolved(WorkloadRef::new(
            WorkloadKind::DaemonSet,
            namespace,
            owner.name.clone(),
        )),
        "StatefulSet" => OwnerLookup::Resolved(WorkloadRef::new(
            WorkloadKind::StatefulSet,
            namespace,
            owner.name.clone(),
        )),
        // Jobs and custom controllers cannot be rolled; the pod itself is reported
        _ => OwnerLookup::Resolved(WorkloadRef::new(WorkloadKind::Pod, namespace, pod_name)),
    }
}

/// Workload for a ReplicaSet given the ReplicaSet's own owner references
pub fn replica_set_workload(
    namespace: &str,
    name: &str,
    owners: Option<&[OwnerReference]>,
) -> WorkloadRef {
    match controller_owner(owners) {
        Some(owner) if owner.kind == "Deployment" => {
            WorkloadRef::new(WorkloadKind::Deployment, namespace, owner.name.clone())
        }
        _ => WorkloadRef::new(WorkloadKind::ReplicaSet, namespace, name),
    }
}

fn controller_owner(owners: Option<&[OwnerReference]>) -> Option<&OwnerReference> {
    let owners = owners?;
    owners
        .iter()
        .find(|o| o.controller == Some(true))
        .or_else(|| owners.first())
}
