//! # Reconciliation Pipeline
//!
//! One pass over an Istio custom resource: discovery, configuration merge,
//! managed resources, then the sidecar restart rollout.

use crate::cluster::ClusterApi;
use crate::clusterconfig::{build_mesh_configuration, evaluate_cluster_profile};
use crate::config::SharedOperatorConfig;
use crate::crd::Istio;
use crate::error::DescribedError;
use crate::resources::{build_resource_set, owner_reference, reconcile_resources};
use crate::restart::{RestartOutcome, SidecarRestartOrchestrator};
use std::sync::Arc;
use tracing::debug;

/// Reconcile mesh resources and roll outdated sidecars
///
/// The merged mesh configuration document is what the Istio installer consumes; this
/// operator also takes the mesh namespace of its managed resources from it.
///
/// Returns the number of restarted workloads. A Warning-level error means the mesh is
/// healthy but some customer workloads still run the old proxy.
pub async fn reconcile_istio(
    api: Arc<dyn ClusterApi>,
    config: SharedOperatorConfig,
    istio: &Istio,
) -> Result<usize, DescribedError> {
    let profile = evaluate_cluster_profile(api.as_ref())
        .await
        .map_err(|e| DescribedError::new(e, "Could not evaluate cluster profile"))?;

    // installer input; its mesh namespace is pinned to the configured one
    let document = build_mesh_configuration(&profile, &istio.spec, &config.istio_namespace)
        .map_err(|e| DescribedError::new(e, "Could not build mesh configuration"))?;
    debug!(namespace = document.istio_namespace(), "Mesh configuration built");

    let owner = owner_reference(istio)
        .map_err(|e| DescribedError::new(e, "Could not reference Istio custom resource"))?;

    let resources = build_resource_set(profile.provider, api.as_ref())
        .await
        .map_err(|e| {
            DescribedError::new(e, "Istio controller failed to initialise Istio resources")
        })?;

    reconcile_resources(api.as_ref(), &owner, &document, &resources)
        .await
        .map_err(|e| DescribedError::new(e, "Istio controller failed to reconcile Istio resources"))?;

    let outcome = SidecarRestartOrchestrator::new(api, config)
        .run_restart(istio)
        .await
        .map_err(|e| DescribedError::new(e, "Sidecar restart did not complete"))?;

    match outcome {
        RestartOutcome::Ready { restarted } => Ok(restarted),
        RestartOutcome::Error(e) => Err(DescribedError::new(
            e,
            "Istio controller failed to restart platform workloads",
        )),
        RestartOutcome::Warning(partial) => Err(DescribedError::warning(
            partial,
            "Not all customer workloads could be restarted",
        )),
        RestartOutcome::Cancelled => Err(DescribedError::cancelled("Sidecar restart cancelled")),
    }
}
