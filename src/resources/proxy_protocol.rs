//! Proxy protocol listener filter for the ingress gateway.
//!
//! Load balancers on AWS and OpenStack forward the client address through the
//! PROXY protocol. Behind an NLB the gateway must also accept plain connections
//! (health checks do not speak the protocol).

use crate::cluster::DesiredResource;
use crate::clusterconfig::OverrideDocument;
use kube::core::GroupVersionKind;
use serde_json::{json, Value};

pub const PROXY_PROTOCOL_FILTER_NAME: &str = "proxy-protocol";

pub(super) fn desired(document: &OverrideDocument, use_nlb: bool) -> DesiredResource {
    let (labels, annotations) = super::managed_metadata();
    DesiredResource {
        gvk: GroupVersionKind::gvk("networking.istio.io", "v1alpha3", "EnvoyFilter"),
        plural: "envoyfilters".to_string(),
        namespace: document.istio_namespace().to_string(),
        name: PROXY_PROTOCOL_FILTER_NAME.to_string(),
        labels,
        annotations,
        spec: filter_spec(use_nlb),
    }
}

fn filter_spec(use_nlb: bool) -> Value {
    json!({
        "workloadSelector": {
            "labels": {
                "istio": "ingressgateway"
            }
        },
        "configPatches": [{
            "applyTo": "LISTENER",
            "patch": {
                "operation": "MERGE",
                "value": {
                    "listener_filters": [
                        {
                            "name": "envoy.filters.listener.proxy_protocol",
                            "typed_config": {
                                "@type": "type.googleapis.com/envoy.extensions.filters.listener.proxy_protocol.v3.ProxyProtocol",
                                "allow_requests_without_proxy_protocol": use_nlb
                            }
                        },
                        {
                            "name": "envoy.filters.listener.tls_inspector",
                            "typed_config": {
                                "@type": "type.googleapis.com/envoy.extensions.filters.listener.tls_inspector.v3.TlsInspector"
                            }
                        }
                    ]
                }
            }
        }]
    })
}
