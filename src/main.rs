//! # Istio Mesh Operator
//!
//! A Kubernetes operator that keeps an Istio installation consistent with the
//! `Istio` custom resource.
//!
//! ## Overview
//!
//! Each reconciliation:
//!
//! 1. **Discovers the cluster** - size, flavor and cloud provider from the node inventory
//! 2. **Builds the mesh configuration** - base template merged with flavor and CR overrides
//! 3. **Reconciles managed resources** - mTLS policy and, on AWS/OpenStack, the proxy protocol filter
//! 4. **Restarts outdated sidecars** - platform workloads first, then customer workloads in chunks
//!
//! The outcome is written to the CR status as Ready, Warning or Error.
//!
//! ## Features
//!
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks
//! - **Graceful shutdown**: SIGTERM cancels in-flight reconciliations at the next API call

use anyhow::Result;
use istio_mesh_operator::runtime::initialization::initialize;
use istio_mesh_operator::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.istios,
        init_result.reconciler,
        init_result.server,
        init_result.shutdown,
    )
    .await
}
