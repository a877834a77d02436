//! # Cluster Configuration
//!
//! Classifies the cluster from its node inventory and derives the mesh configuration
//! document from that classification.
//!
//! - `discovery` - size, flavor and provider classification
//! - `overrides` - base templates, flavor overrides and the override-wins merge
//! - `quantity` - Kubernetes quantity parsing for capacity sums
//!
//! A [`ClusterProfile`] is computed once per reconciliation and passed explicitly to
//! every consumer; it is never cached across reconciliations so that cluster resizes
//! and migrations are picked up on the next cycle.

pub mod discovery;
pub mod overrides;
pub mod quantity;

pub use discovery::*;
pub use overrides::*;

use std::fmt;

/// Capacity-based cluster size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterSize {
    #[default]
    Unknown,
    Evaluation,
    Production,
}

impl fmt::Display for ClusterSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = match self {
            ClusterSize::Unknown => "Unknown",
            ClusterSize::Evaluation => "Evaluation",
            ClusterSize::Production => "Production",
        };
        f.write_str(size)
    }
}

/// Kubernetes distribution the cluster runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterFlavor {
    #[default]
    Unknown,
    K3d,
    Gke,
    Gardener,
}

impl fmt::Display for ClusterFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flavor = match self {
            ClusterFlavor::Unknown => "Unknown",
            ClusterFlavor::K3d => "k3d",
            ClusterFlavor::Gke => "GKE",
            ClusterFlavor::Gardener => "Gardener",
        };
        f.write_str(flavor)
    }
}

/// Hyperscaler backing the cluster nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provider {
    Aws,
    Openstack,
    #[default]
    Other,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provider = match self {
            Provider::Aws => "aws",
            Provider::Openstack => "openstack",
            Provider::Other => "other",
        };
        f.write_str(provider)
    }
}

/// Classification of the cluster for one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterProfile {
    pub size: ClusterSize,
    pub flavor: ClusterFlavor,
    pub provider: Provider,
}
