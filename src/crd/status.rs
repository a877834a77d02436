//! # Istio Status
//!
//! Status types for tracking reconciliation state and conditions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse reconciliation state consumed by downstream tooling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum State {
    /// Reconciliation in progress
    Processing,
    /// Mesh resources and all sidecars are up to date
    Ready,
    /// Reconciliation or platform restart failed; no further progress can be assumed
    Error,
    /// Mesh is healthy but some customer workloads still run the old proxy
    Warning,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            State::Processing => "Processing",
            State::Ready => "Ready",
            State::Error => "Error",
            State::Warning => "Warning",
        };
        f.write_str(state)
    }
}

/// Status of the Istio resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IstioStatus {
    /// Current reconciliation state
    #[serde(default)]
    pub state: Option<State>,
    /// Human-readable description of current state
    #[serde(default)]
    pub description: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last reconciliation time (RFC3339)
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
    /// Customer workloads that could not be restarted in the last rollout
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_workloads: Vec<FailedWorkload>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

/// Workload left on the old proxy configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FailedWorkload {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// Last error returned for this workload
    pub message: String,
}
