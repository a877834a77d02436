//! # Sidecar Restart
//!
//! Two-phase rollout of proxy changes into running workloads.
//!
//! - `state` - pure rollout state machine and the per-phase restart plan
//! - `orchestrator` - drives the state machine against the [`ClusterApi`](crate::cluster::ClusterApi)

mod orchestrator;
mod state;

pub use orchestrator::{RestartOutcome, SidecarRestartOrchestrator};
pub use state::{InvalidTransition, PhaseOutcome, RestartPhase, RestartPlan, RestartState};
