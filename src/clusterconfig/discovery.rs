//! # Cluster Discovery
//!
//! Classifies the cluster from the node inventory.
//!
//! Flavor and provider detection are heuristics over loosely structured node metadata.
//! Both are expressed as ordered rule tables so that a new signature is a new table
//! entry rather than a new branch.

use super::quantity::parse_quantity;
use super::{ClusterFlavor, ClusterProfile, ClusterSize, Provider};
use crate::cluster::{ClusterApi, NodeInfo};
use crate::error::DiscoveryError;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Total allocatable CPU (cores) below which the cluster is an evaluation cluster
pub const PRODUCTION_CLUSTER_CPU_THRESHOLD: f64 = 5.0;

/// Total allocatable memory (gigabytes) below which the cluster is an evaluation cluster
pub const PRODUCTION_CLUSTER_MEMORY_THRESHOLD_GB: f64 = 10.0;

/// Node field a classification rule inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeField {
    KubeletVersion,
    OsImage,
}

impl NodeField {
    fn value<'a>(&self, node: &'a NodeInfo) -> &'a str {
        match self {
            NodeField::KubeletVersion => &node.kubelet_version,
            NodeField::OsImage => &node.os_image,
        }
    }
}

/// Pattern over a node field and the flavor it implies
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub field: NodeField,
    pub pattern: Regex,
    pub flavor: ClusterFlavor,
}

impl ClassificationRule {
    pub fn matches(&self, node: &NodeInfo) -> bool {
        self.pattern.is_match(self.field.value(node))
    }
}

/// Flavor rules in priority order
pub static FLAVOR_RULES: LazyLock<Vec<ClassificationRule>> = LazyLock::new(|| {
    vec![
        ClassificationRule {
            field: NodeField::KubeletVersion,
            pattern: Regex::new(r"^v\d+\.\d+\.\d+-gke\.\d+$")
                .expect("Failed to compile GKE pattern - this should never happen"),
            flavor: ClusterFlavor::Gke,
        },
        ClassificationRule {
            field: NodeField::KubeletVersion,
            pattern: Regex::new(r"^v\d+\.\d+\.\d+\+k3s\d+$")
                .expect("Failed to compile k3s pattern - this should never happen"),
            flavor: ClusterFlavor::K3d,
        },
        ClassificationRule {
            field: NodeField::OsImage,
            pattern: Regex::new(r"^Garden Linux \d+.\d+$")
                .expect("Failed to compile Garden Linux pattern - this should never happen"),
            flavor: ClusterFlavor::Gardener,
        },
    ]
});

/// Provider id prefixes and the provider they identify
pub const PROVIDER_PREFIXES: &[(&str, Provider)] = &[
    ("aws://", Provider::Aws),
    ("openstack://", Provider::Openstack),
];

/// Classify cluster size from allocatable capacity
///
/// Evaluation if either total is strictly below its threshold; an empty node list
/// sums to zero and is therefore Evaluation.
pub fn classify_size(nodes: &[NodeInfo]) -> ClusterSize {
    let cpu: f64 = nodes
        .iter()
        .map(|n| quantity_or_zero(&n.name, "cpu", n.allocatable_cpu.as_deref()))
        .sum();
    let memory: f64 = nodes
        .iter()
        .map(|n| quantity_or_zero(&n.name, "memory", n.allocatable_memory.as_deref()))
        .sum();

    debug!(
        "Cluster capacity: cpu={} cores, memory={} bytes across {} node(s)",
        cpu,
        memory,
        nodes.len()
    );

    if cpu < PRODUCTION_CLUSTER_CPU_THRESHOLD || memory < PRODUCTION_CLUSTER_MEMORY_THRESHOLD_GB * 1e9
    {
        ClusterSize::Evaluation
    } else {
        ClusterSize::Production
    }
}

fn quantity_or_zero(node: &str, resource: &str, quantity: Option<&str>) -> f64 {
    let Some(quantity) = quantity else {
        return 0.0;
    };
    parse_quantity(quantity).unwrap_or_else(|e| {
        warn!("Ignoring allocatable {} of node {}: {}", resource, node, e);
        0.0
    })
}

/// Classify the cluster flavor
///
/// Nodes are scanned in listing order; for each node the rules are tried in
/// priority order. The first match decides.
pub fn classify_flavor(nodes: &[NodeInfo], rules: &[ClassificationRule]) -> ClusterFlavor {
    nodes
        .iter()
        .find_map(|node| rules.iter().find(|rule| rule.matches(node)))
        .map_or(ClusterFlavor::Unknown, |rule| rule.flavor)
}

/// Classify the provider from the first node's provider id
pub fn classify_provider(nodes: &[NodeInfo]) -> Provider {
    let Some(node) = nodes.first() else {
        info!("Unable to determine cloud provider due to empty node list, using 'other' as provider");
        return Provider::Other;
    };

    PROVIDER_PREFIXES
        .iter()
        .find(|(prefix, _)| node.provider_id.starts_with(prefix))
        .map_or(Provider::Other, |(_, provider)| *provider)
}

async fn list_nodes(api: &dyn ClusterApi) -> Result<Vec<NodeInfo>, DiscoveryError> {
    api.list_nodes().await.map_err(DiscoveryError::ListNodes)
}

/// Evaluate the cluster size from live node inventory
pub async fn evaluate_cluster_size(api: &dyn ClusterApi) -> Result<ClusterSize, DiscoveryError> {
    Ok(classify_size(&list_nodes(api).await?))
}

/// Discover the cluster flavor from live node inventory
pub async fn discover_cluster_flavor(
    api: &dyn ClusterApi,
) -> Result<ClusterFlavor, DiscoveryError> {
    Ok(classify_flavor(&list_nodes(api).await?, &FLAVOR_RULES))
}

/// Determine the hyperscaler from live node inventory
pub async fn get_cluster_provider(api: &dyn ClusterApi) -> Result<Provider, DiscoveryError> {
    Ok(classify_provider(&list_nodes(api).await?))
}

/// Evaluate the full profile from a single node listing
pub async fn evaluate_cluster_profile(
    api: &dyn ClusterApi,
) -> Result<ClusterProfile, DiscoveryError> {
    let nodes = list_nodes(api).await?;
    let profile = ClusterProfile {
        size: classify_size(&nodes),
        flavor: classify_flavor(&nodes, &FLAVOR_RULES),
        provider: classify_provider(&nodes),
    };
    info!(
        "Cluster profile: size={}, flavor={}, provider={}",
        profile.size, profile.flavor, profile.provider
    );
    Ok(profile)
}
