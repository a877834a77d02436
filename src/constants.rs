//! # Constants
//!
//! Default values and well-known names shared across the operator.

/// Field manager used for every write the operator issues
pub const FIELD_MANAGER: &str = "istio-mesh-operator";

/// Namespace the mesh control plane lives in
pub const DEFAULT_ISTIO_NAMESPACE: &str = "istio-system";

/// Comma separated list of namespaces holding platform workloads
pub const DEFAULT_PLATFORM_NAMESPACES: &str = "kyma-system";

/// Number of customer workloads restarted per chunk
pub const DEFAULT_RESTART_CHUNK_SIZE: usize = 10;

/// Sidecar image the proxies are expected to run after an upgrade
pub const DEFAULT_PROXY_IMAGE: &str =
    "europe-docker.pkg.dev/kyma-project/prod/external/istio/proxyv2:1.24.1-distroless";

/// Page size used when listing pods
pub const POD_LIST_PAGE_SIZE: u32 = 500;

// HTTP server
pub const DEFAULT_METRICS_PORT: u16 = 5000;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

// Requeue intervals
pub const DEFAULT_READY_REQUEUE_SECS: u64 = 3600;
pub const DEFAULT_WARNING_REQUEUE_SECS: u64 = 60;
pub const DEFAULT_CANCELLED_REQUEUE_SECS: u64 = 5;
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

// Labels and annotations stamped on managed resources
pub const MODULE_LABEL_KEY: &str = "kyma-project.io/module";
pub const MODULE_LABEL_VALUE: &str = "istio";
pub const DISCLAIMER_ANNOTATION_KEY: &str = "istios.operator.kyma-project.io/managed-by-disclaimer";
pub const DISCLAIMER_ANNOTATION_VALUE: &str = "DO NOT EDIT - This resource is managed by Kyma.\nAny modifications are discarded and the resource is reverted to the original state.";

// Sidecar handling
pub const RESTARTED_AT_ANNOTATION: &str = "istio.operator.kyma-project.io/restartedAt";
pub const SIDECAR_INJECT_ANNOTATION: &str = "sidecar.istio.io/inject";
pub const SIDECAR_CONTAINER_NAME: &str = "istio-proxy";

/// ConfigMap whose presence marks an AWS cluster that still uses classic ELB
pub const ELB_DEPRECATED_CONFIGMAP: &str = "elb-deprecated";
