//! # Operator Configuration
//!
//! Operator-level configuration loaded from environment variables (populated from a ConfigMap).
//!
//! All configuration has sensible defaults and can be overridden via environment variables.
//! The configuration is read once at startup and shared read-only with every reconciliation.

use crate::constants::*;
use std::sync::Arc;

/// Shared, read-only operator configuration
pub type SharedOperatorConfig = Arc<OperatorConfig>;

/// Operator configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Namespace of the mesh control plane
    pub istio_namespace: String,
    /// Namespaces whose workloads are restarted in the platform phase
    pub platform_namespaces: Vec<String>,
    /// Number of customer workloads restarted per chunk
    pub restart_chunk_size: usize,
    /// Sidecar image every injected proxy should run
    pub proxy_image: String,
    /// HTTP server port for metrics and health probes
    pub metrics_port: u16,
    /// How long to wait for the HTTP server to be ready (seconds)
    pub server_startup_timeout_secs: u64,
    /// How often to check server readiness during startup (milliseconds)
    pub server_poll_interval_ms: u64,
    /// Requeue interval after a Ready reconciliation (seconds)
    pub ready_requeue_secs: u64,
    /// Requeue interval after a Warning reconciliation (seconds)
    pub warning_requeue_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            istio_namespace: DEFAULT_ISTIO_NAMESPACE.to_string(),
            platform_namespaces: parse_namespace_list(DEFAULT_PLATFORM_NAMESPACES),
            restart_chunk_size: DEFAULT_RESTART_CHUNK_SIZE,
            proxy_image: DEFAULT_PROXY_IMAGE.to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            server_startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            server_poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            ready_requeue_secs: DEFAULT_READY_REQUEUE_SECS,
            warning_requeue_secs: DEFAULT_WARNING_REQUEUE_SECS,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let chunk_size = value_or_default(&lookup, "RESTART_CHUNK_SIZE", defaults.restart_chunk_size);
        Self {
            istio_namespace: lookup("ISTIO_NAMESPACE")
                .filter(|ns| !ns.trim().is_empty())
                .unwrap_or(defaults.istio_namespace),
            platform_namespaces: lookup("PLATFORM_NAMESPACES")
                .map(|list| parse_namespace_list(&list))
                .unwrap_or(defaults.platform_namespaces),
            // A zero chunk size would never make progress
            restart_chunk_size: if chunk_size == 0 {
                DEFAULT_RESTART_CHUNK_SIZE
            } else {
                chunk_size
            },
            proxy_image: lookup("PROXY_IMAGE")
                .filter(|image| !image.trim().is_empty())
                .unwrap_or(defaults.proxy_image),
            metrics_port: value_or_default(&lookup, "METRICS_PORT", defaults.metrics_port),
            server_startup_timeout_secs: value_or_default(
                &lookup,
                "SERVER_STARTUP_TIMEOUT_SECS",
                defaults.server_startup_timeout_secs,
            ),
            server_poll_interval_ms: value_or_default(
                &lookup,
                "SERVER_POLL_INTERVAL_MS",
                defaults.server_poll_interval_ms,
            ),
            ready_requeue_secs: value_or_default(
                &lookup,
                "READY_REQUEUE_SECS",
                defaults.ready_requeue_secs,
            ),
            warning_requeue_secs: value_or_default(
                &lookup,
                "WARNING_REQUEUE_SECS",
                defaults.warning_requeue_secs,
            ),
        }
    }
}

/// Read a value through `lookup` or return the default value
fn value_or_default<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_namespace_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(ToString::to_string)
        .collect()
}
