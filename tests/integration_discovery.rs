//! Cluster discovery against an in-memory node inventory

#[path = "integration/fake_cluster/mod.rs"]
mod fake_cluster;

use fake_cluster::{aws_node, node, openstack_node, FakeCluster};
use istio_mesh_operator::cluster::NodeInfo;
use istio_mesh_operator::clusterconfig::{
    build_mesh_configuration, discover_cluster_flavor, evaluate_cluster_profile,
    evaluate_cluster_size, get_cluster_provider, ClusterFlavor, ClusterSize, Provider,
};
use istio_mesh_operator::error::DiscoveryError;
use istio_mesh_operator::IstioSpec;
use serde_json::json;

#[tokio::test]
async fn test_two_small_nodes_are_an_evaluation_cluster() {
    let cluster = FakeCluster::new().with_nodes(vec![node("2", "4Gi"), node("2", "4Gi")]);
    assert_eq!(
        evaluate_cluster_size(&cluster).await.unwrap(),
        ClusterSize::Evaluation
    );
}

#[tokio::test]
async fn test_three_small_nodes_are_a_production_cluster() {
    let cluster = FakeCluster::new().with_nodes(vec![
        node("2", "4Gi"),
        node("2", "4Gi"),
        node("2", "4Gi"),
    ]);
    assert_eq!(
        evaluate_cluster_size(&cluster).await.unwrap(),
        ClusterSize::Production
    );
}

#[tokio::test]
async fn test_millicore_and_decimal_quantities_are_summed() {
    // 3 x 1930m = 5.79 cores, 3 x 3.5G = 10.5 GB
    let cluster = FakeCluster::new().with_nodes(vec![
        node("1930m", "3500M"),
        node("1930m", "3500M"),
        node("1930m", "3500M"),
    ]);
    assert_eq!(
        evaluate_cluster_size(&cluster).await.unwrap(),
        ClusterSize::Production
    );
}

#[tokio::test]
async fn test_empty_cluster_is_other_provider() {
    let cluster = FakeCluster::new();
    let profile = evaluate_cluster_profile(&cluster).await.unwrap();
    assert_eq!(profile.provider, Provider::Other);
    assert_eq!(profile.flavor, ClusterFlavor::Unknown);
    assert_eq!(profile.size, ClusterSize::Evaluation);
}

#[tokio::test]
async fn test_provider_comes_from_first_node() {
    let cluster = FakeCluster::new().with_nodes(vec![aws_node(), openstack_node()]);
    assert_eq!(get_cluster_provider(&cluster).await.unwrap(), Provider::Aws);

    let cluster = FakeCluster::new().with_nodes(vec![openstack_node(), aws_node()]);
    assert_eq!(
        get_cluster_provider(&cluster).await.unwrap(),
        Provider::Openstack
    );
}

#[tokio::test]
async fn test_flavor_rules_apply_in_priority_order() {
    let gke_on_garden_linux = NodeInfo {
        kubelet_version: "v1.30.5-gke.1014001".to_string(),
        os_image: "Garden Linux 1443.10".to_string(),
        ..node("4", "16Gi")
    };
    let cluster = FakeCluster::new().with_nodes(vec![gke_on_garden_linux]);
    assert_eq!(
        discover_cluster_flavor(&cluster).await.unwrap(),
        ClusterFlavor::Gke
    );

    let gardener = NodeInfo {
        os_image: "Garden Linux 1592.1".to_string(),
        ..node("4", "16Gi")
    };
    let cluster = FakeCluster::new().with_nodes(vec![node("4", "16Gi"), gardener]);
    assert_eq!(
        discover_cluster_flavor(&cluster).await.unwrap(),
        ClusterFlavor::Gardener
    );
}

#[tokio::test]
async fn test_node_listing_failure_is_a_discovery_error() {
    let cluster = FakeCluster::new();
    cluster.fail_list_nodes();
    let err = evaluate_cluster_profile(&cluster).await.unwrap_err();
    assert!(matches!(err, DiscoveryError::ListNodes(_)));
    assert!(err.to_string().contains("forbidden"));
}

#[tokio::test]
async fn test_k3d_evaluation_profile_drives_mesh_configuration() {
    let k3s = NodeInfo {
        kubelet_version: "v1.31.2+k3s1".to_string(),
        ..node("2", "4Gi")
    };
    let cluster = FakeCluster::new().with_nodes(vec![k3s]);
    let profile = evaluate_cluster_profile(&cluster).await.unwrap();
    assert_eq!(profile.size, ClusterSize::Evaluation);
    assert_eq!(profile.flavor, ClusterFlavor::K3d);

    let document =
        build_mesh_configuration(&profile, &IstioSpec::default(), "istio-system").unwrap();
    assert_eq!(
        document.get(&["spec", "components", "pilot", "k8s", "replicaCount"]),
        Some(&json!(1))
    );
    assert_eq!(
        document.get(&["spec", "values", "cni", "cniBinDir"]),
        Some(&json!("/bin"))
    );
}
