//! Mesh-wide mutual TLS policy.

use crate::cluster::DesiredResource;
use crate::clusterconfig::OverrideDocument;
use kube::core::GroupVersionKind;
use serde_json::json;

pub const PEER_AUTHENTICATION_NAME: &str = "default";

pub(super) fn desired(document: &OverrideDocument) -> DesiredResource {
    let (labels, annotations) = super::managed_metadata();
    DesiredResource {
        gvk: GroupVersionKind::gvk("security.istio.io", "v1", "PeerAuthentication"),
        plural: "peerauthentications".to_string(),
        namespace: document.istio_namespace().to_string(),
        name: PEER_AUTHENTICATION_NAME.to_string(),
        labels,
        annotations,
        spec: json!({
            "mtls": {
                "mode": "STRICT"
            }
        }),
    }
}
