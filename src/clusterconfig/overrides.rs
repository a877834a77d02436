//! # Configuration Overrides
//!
//! Builds the mesh configuration document: a base template selected by cluster size,
//! merged with flavor-specific overrides, the operator's mesh namespace and the
//! overrides declared on the Istio CR.
//!
//! Merging is override-wins at every depth, pure and deterministic.

use super::{ClusterFlavor, ClusterProfile, ClusterSize};
use crate::constants::DEFAULT_ISTIO_NAMESPACE;
use crate::crd::IstioSpec;
use crate::error::MergeError;
use serde_json::{json, Map, Value};

/// Base template for production-sized clusters
pub const PRODUCTION_TEMPLATE: &str = include_str!("templates/production.yaml");

/// Base template for evaluation-sized clusters (single replicas, smaller limits)
pub const EVALUATION_TEMPLATE: &str = include_str!("templates/evaluation.yaml");

/// Select the base template for a cluster size
pub fn base_template(size: ClusterSize) -> &'static str {
    match size {
        ClusterSize::Evaluation => EVALUATION_TEMPLATE,
        ClusterSize::Production | ClusterSize::Unknown => PRODUCTION_TEMPLATE,
    }
}

/// Tree-structured configuration document; always a mapping at the top level
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideDocument(Value);

impl Default for OverrideDocument {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl OverrideDocument {
    /// Wrap a value; `null` is treated as an empty document
    pub fn from_value(value: Value) -> Result<Self, MergeError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => Ok(Self(value)),
            other => Err(MergeError::NotAMapping(kind(&other))),
        }
    }

    pub fn from_yaml(document: &str) -> Result<Self, MergeError> {
        Self::from_value(serde_yaml::from_str(document)?)
    }

    pub fn to_yaml(&self) -> Result<String, MergeError> {
        serde_yaml::to_string(&self.0).map_err(MergeError::Render)
    }

    /// Value at a key path, if present
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(&self.0, |value, key| value.get(key))
    }

    /// Merge `overrides` into this document; override fields win at every depth
    pub fn merge(&mut self, overrides: &OverrideDocument) -> Result<(), MergeError> {
        merge_value(&mut self.0, &overrides.0, "")
    }

    pub fn merged(mut self, overrides: &OverrideDocument) -> Result<Self, MergeError> {
        self.merge(overrides)?;
        Ok(self)
    }

    /// Namespace the mesh control plane is installed into
    pub fn istio_namespace(&self) -> &str {
        self.get(&["spec", "values", "global", "istioNamespace"])
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_ISTIO_NAMESPACE)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Object(_) => "mapping",
        Value::Array(_) => "sequence",
        Value::Bool(_) | Value::Number(_) | Value::String(_) => "scalar",
    }
}

fn merge_value(base: &mut Value, overrides: &Value, path: &str) -> Result<(), MergeError> {
    // null never erases a base value
    if overrides.is_null() {
        return Ok(());
    }

    if let (Value::Object(base_map), Value::Object(override_map)) = (&mut *base, overrides) {
        for (key, value) in override_map {
            let child_path = if path.is_empty() {
                key.clone()
            } else {
                format!("{path}.{key}")
            };
            if let Some(existing) = base_map.get_mut(key) {
                merge_value(existing, value, &child_path)?;
            } else {
                base_map.insert(key.clone(), value.clone());
            }
        }
        return Ok(());
    }

    if base.is_null() || kind(base) == kind(overrides) {
        *base = overrides.clone();
        return Ok(());
    }

    Err(MergeError::TypeConflict {
        path: path.to_string(),
        base_kind: kind(base),
        override_kind: kind(overrides),
    })
}

/// Overrides contributed by the cluster flavor
pub fn flavor_overrides(flavor: ClusterFlavor) -> OverrideDocument {
    let value = match flavor {
        ClusterFlavor::K3d => json!({
            "spec": {
                "values": {
                    "cni": {
                        "cniBinDir": "/bin",
                        "cniConfDir": "/var/lib/rancher/k3s/agent/etc/cni/net.d"
                    }
                }
            }
        }),
        ClusterFlavor::Gke => json!({
            "spec": {
                "values": {
                    "cni": {
                        "cniBinDir": "/home/kubernetes/bin",
                        "resourceQuotas": {
                            "enabled": true
                        }
                    }
                }
            }
        }),
        ClusterFlavor::Gardener | ClusterFlavor::Unknown => return OverrideDocument::default(),
    };
    OverrideDocument(value)
}

/// Pins the mesh namespace to the one the operator is configured with
pub fn namespace_overrides(istio_namespace: &str) -> OverrideDocument {
    OverrideDocument(json!({
        "spec": {
            "values": {
                "global": {
                    "istioNamespace": istio_namespace
                }
            }
        }
    }))
}

/// Overrides declared on the Istio custom resource
pub fn spec_overrides(spec: &IstioSpec) -> OverrideDocument {
    let mut document = OverrideDocument::default();
    if let Some(num_trusted_proxies) = spec.config.as_ref().and_then(|c| c.num_trusted_proxies) {
        document.0 = json!({
            "spec": {
                "meshConfig": {
                    "defaultConfig": {
                        "gatewayTopology": {
                            "numTrustedProxies": num_trusted_proxies
                        }
                    }
                }
            }
        });
    }
    document
}

/// Merge overrides into a YAML template and render the result as YAML
pub fn merge_overrides(template: &str, overrides: &OverrideDocument) -> Result<String, MergeError> {
    OverrideDocument::from_yaml(template)?
        .merged(overrides)?
        .to_yaml()
}

/// Final mesh configuration for a cluster profile and CR spec
///
/// Layers, lowest first: size template, flavor, operator namespace, CR overrides.
pub fn build_mesh_configuration(
    profile: &ClusterProfile,
    spec: &IstioSpec,
    istio_namespace: &str,
) -> Result<OverrideDocument, MergeError> {
    OverrideDocument::from_yaml(base_template(profile.size))?
        .merged(&flavor_overrides(profile.flavor))?
        .merged(&namespace_overrides(istio_namespace))?
        .merged(&spec_overrides(spec))
}
