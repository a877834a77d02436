//! # Managed Resources
//!
//! Mesh resources the operator keeps in sync, owned by the Istio custom resource.
//!
//! - `peer_authentication` - mesh-wide STRICT mutual TLS policy
//! - `proxy_protocol` - PROXY protocol listener filter for the ingress gateway
//!
//! Which resources exist depends on the cloud provider. The mapping is the static
//! [`resource_table`]; the resources are applied in table order and the first failure
//! aborts the rest.

mod peer_authentication;
mod proxy_protocol;

pub use peer_authentication::PEER_AUTHENTICATION_NAME;
pub use proxy_protocol::PROXY_PROTOCOL_FILTER_NAME;

use crate::cluster::{ClusterApi, DesiredResource, OperationResult};
use crate::clusterconfig::{OverrideDocument, Provider};
use crate::constants::{
    DISCLAIMER_ANNOTATION_KEY, DISCLAIMER_ANNOTATION_VALUE, MODULE_LABEL_KEY, MODULE_LABEL_VALUE,
};
use crate::crd::Istio;
use crate::error::{ClusterApiError, DiscoveryError, ResourceReconcileError};
use crate::observability::metrics;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::info;

/// How the load balancer mode of the proxy protocol filter is decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NlbMode {
    /// Ask the cluster whether the gateway sits behind an NLB
    Detect,
    /// Never NLB
    Disabled,
}

/// Entry of the provider resource table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    PeerAuthenticationMtls,
    ProxyProtocolFilter(NlbMode),
}

const BASELINE_RESOURCES: &[ResourceKind] = &[ResourceKind::PeerAuthenticationMtls];

const AWS_RESOURCES: &[ResourceKind] = &[
    ResourceKind::PeerAuthenticationMtls,
    ResourceKind::ProxyProtocolFilter(NlbMode::Detect),
];

// NLB is only a default on AWS
const OPENSTACK_RESOURCES: &[ResourceKind] = &[
    ResourceKind::PeerAuthenticationMtls,
    ResourceKind::ProxyProtocolFilter(NlbMode::Disabled),
];

/// Ordered resource kinds required on a provider; dependencies come first
pub fn resource_table(provider: Provider) -> &'static [ResourceKind] {
    match provider {
        Provider::Aws => AWS_RESOURCES,
        Provider::Openstack => OPENSTACK_RESOURCES,
        Provider::Other => BASELINE_RESOURCES,
    }
}

/// A mesh resource the operator owns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagedResource {
    PeerAuthenticationMtls,
    ProxyProtocolFilter { use_nlb: bool },
}

impl ManagedResource {
    pub fn name(&self) -> &'static str {
        match self {
            ManagedResource::PeerAuthenticationMtls => PEER_AUTHENTICATION_NAME,
            ManagedResource::ProxyProtocolFilter { .. } => PROXY_PROTOCOL_FILTER_NAME,
        }
    }

    /// Desired cluster object for this resource
    pub fn desired(&self, document: &OverrideDocument) -> DesiredResource {
        match self {
            ManagedResource::PeerAuthenticationMtls => peer_authentication::desired(document),
            ManagedResource::ProxyProtocolFilter { use_nlb } => {
                proxy_protocol::desired(document, *use_nlb)
            }
        }
    }

    pub async fn reconcile(
        &self,
        api: &dyn ClusterApi,
        owner: &OwnerReference,
        document: &OverrideDocument,
    ) -> Result<OperationResult, ClusterApiError> {
        api.create_or_update(&self.desired(document), owner).await
    }
}

fn managed_metadata() -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let labels = BTreeMap::from([(
        MODULE_LABEL_KEY.to_string(),
        MODULE_LABEL_VALUE.to_string(),
    )]);
    let annotations = BTreeMap::from([(
        DISCLAIMER_ANNOTATION_KEY.to_string(),
        DISCLAIMER_ANNOTATION_VALUE.to_string(),
    )]);
    (labels, annotations)
}

/// Assemble the ordered resource set for a provider
///
/// The load balancer signal is only queried when a table entry asks for it,
/// and at most once.
pub async fn build_resource_set(
    provider: Provider,
    api: &dyn ClusterApi,
) -> Result<Vec<ManagedResource>, DiscoveryError> {
    let mut use_nlb = None;
    let mut resources = Vec::new();

    for kind in resource_table(provider) {
        let resource = match kind {
            ResourceKind::PeerAuthenticationMtls => ManagedResource::PeerAuthenticationMtls,
            ResourceKind::ProxyProtocolFilter(NlbMode::Disabled) => {
                ManagedResource::ProxyProtocolFilter { use_nlb: false }
            }
            ResourceKind::ProxyProtocolFilter(NlbMode::Detect) => {
                let nlb = match use_nlb {
                    Some(nlb) => nlb,
                    None => {
                        let nlb = api
                            .should_use_nlb()
                            .await
                            .map_err(DiscoveryError::LoadBalancerMode)?;
                        use_nlb = Some(nlb);
                        nlb
                    }
                };
                ManagedResource::ProxyProtocolFilter { use_nlb: nlb }
            }
        };
        resources.push(resource);
    }

    Ok(resources)
}

/// Apply every resource in order, stopping at the first failure
///
/// Resources applied before a failure stay in place; the next reconciliation starts
/// again from the top.
pub async fn reconcile_resources(
    api: &dyn ClusterApi,
    owner: &OwnerReference,
    document: &OverrideDocument,
    resources: &[ManagedResource],
) -> Result<(), ResourceReconcileError> {
    info!("Reconciling Istio resources");

    for resource in resources {
        let name = resource.name();
        info!(resource = name, "Reconciling Istio resource");

        let result = resource
            .reconcile(api, owner, document)
            .await
            .map_err(|source| ResourceReconcileError {
                resource: name.to_string(),
                source,
            })?;

        metrics::increment_resource_operations(name, result.as_str());
        info!(resource = name, result = %result, "Reconciled Istio resource");
    }

    info!("Successfully reconciled Istio resources");
    Ok(())
}

/// Owner reference pointing at the Istio custom resource
pub fn owner_reference(istio: &Istio) -> Result<OwnerReference, ClusterApiError> {
    istio
        .owner_ref(&())
        .ok_or_else(|| ClusterApiError::MissingOwner(format!("Istio {}", istio.name_any())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterApi;
    use crate::crd::IstioSpec;

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "operator.kyma-project.io/v1alpha2".to_string(),
            kind: "Istio".to_string(),
            name: "default".to_string(),
            uid: "3b0d".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resource_table_orders_policy_first() {
        for provider in [Provider::Aws, Provider::Openstack, Provider::Other] {
            assert_eq!(
                resource_table(provider)[0],
                ResourceKind::PeerAuthenticationMtls
            );
        }
        assert_eq!(resource_table(Provider::Other).len(), 1);
    }

    #[tokio::test]
    async fn test_aws_queries_load_balancer_mode() {
        let mut mock = MockClusterApi::new();
        mock.expect_should_use_nlb().times(1).returning(|| Ok(true));

        let resources = build_resource_set(Provider::Aws, &mock).await.unwrap();
        assert_eq!(
            resources,
            vec![
                ManagedResource::PeerAuthenticationMtls,
                ManagedResource::ProxyProtocolFilter { use_nlb: true }
            ]
        );
    }

    #[tokio::test]
    async fn test_openstack_forces_nlb_off_without_asking() {
        let mut mock = MockClusterApi::new();
        mock.expect_should_use_nlb().times(0);

        let resources = build_resource_set(Provider::Openstack, &mock)
            .await
            .unwrap();
        assert_eq!(
            resources,
            vec![
                ManagedResource::PeerAuthenticationMtls,
                ManagedResource::ProxyProtocolFilter { use_nlb: false }
            ]
        );

        let resources = build_resource_set(Provider::Other, &mock).await.unwrap();
        assert_eq!(resources, vec![ManagedResource::PeerAuthenticationMtls]);
    }

    #[tokio::test]
    async fn test_load_balancer_signal_failure_is_discovery_error() {
        let mut mock = MockClusterApi::new();
        mock.expect_should_use_nlb()
            .returning(|| Err(ClusterApiError::Other("forbidden".to_string())));

        let err = build_resource_set(Provider::Aws, &mock).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::LoadBalancerMode(_)));
    }

    #[tokio::test]
    async fn test_reconcile_stops_at_first_failure() {
        let mut mock = MockClusterApi::new();
        mock.expect_create_or_update()
            .times(2)
            .returning(|desired, _| {
                if desired.name == PROXY_PROTOCOL_FILTER_NAME {
                    Err(ClusterApiError::Other("admission webhook denied".to_string()))
                } else {
                    Ok(OperationResult::Created)
                }
            });

        let resources = [
            ManagedResource::PeerAuthenticationMtls,
            ManagedResource::ProxyProtocolFilter { use_nlb: true },
            ManagedResource::PeerAuthenticationMtls,
        ];
        let err = reconcile_resources(&mock, &owner(), &OverrideDocument::default(), &resources)
            .await
            .unwrap_err();
        assert_eq!(err.resource, "proxy-protocol");
        assert!(err.to_string().contains("admission webhook denied"));
    }

    #[tokio::test]
    async fn test_managed_metadata_and_owner_are_passed() {
        let mut mock = MockClusterApi::new();
        mock.expect_create_or_update()
            .times(1)
            .withf(|desired, owner| {
                desired.labels.get(MODULE_LABEL_KEY).map(String::as_str) == Some("istio")
                    && desired.annotations.contains_key(DISCLAIMER_ANNOTATION_KEY)
                    && owner.uid == "3b0d"
            })
            .returning(|_, _| Ok(OperationResult::Unchanged));

        reconcile_resources(
            &mock,
            &owner(),
            &OverrideDocument::default(),
            &[ManagedResource::PeerAuthenticationMtls],
        )
        .await
        .unwrap();
    }

    #[test]
    fn test_owner_reference_requires_uid() {
        let mut istio = Istio::new("default", IstioSpec::default());
        istio.metadata.namespace = Some("kyma-system".to_string());
        assert!(matches!(
            owner_reference(&istio),
            Err(ClusterApiError::MissingOwner(_))
        ));

        istio.metadata.uid = Some("3b0d".to_string());
        let owner = owner_reference(&istio).unwrap();
        assert_eq!(owner.kind, "Istio");
        assert_eq!(owner.uid, "3b0d");
        assert_eq!(owner.api_version, "operator.kyma-project.io/v1alpha2");
    }
}
