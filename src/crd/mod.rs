//! # Custom Resource Definitions
//!
//! CRD types for the Istio module operator.
//!
//! The `Istio` custom resource declares the desired state of the mesh installation.
//! Every managed resource is owned by it, so deleting the CR garbage-collects them.

mod status;

pub use status::*;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Istio Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: operator.kyma-project.io/v1alpha2
/// kind: Istio
/// metadata:
///   name: default
///   namespace: kyma-system
/// spec:
///   config:
///     numTrustedProxies: 1
///   sidecarRestart:
///     chunkSize: 20
/// ```
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Istio",
    group = "operator.kyma-project.io",
    version = "v1alpha2",
    namespaced,
    status = "IstioStatus",
    shortname = "istio",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IstioSpec {
    /// Mesh-wide configuration applied on top of the cluster defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<MeshConfig>,
    /// Tuning of the sidecar restart rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_restart: Option<SidecarRestartConfig>,
}

/// Mesh-wide configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeshConfig {
    /// Number of trusted proxies in front of the ingress gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_trusted_proxies: Option<i32>,
}

/// Sidecar restart rollout configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SidecarRestartConfig {
    /// Number of customer workloads restarted per chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,
}
