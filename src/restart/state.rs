//! # Restart State Machine
//!
//! Rollout policy of the sidecar restart, kept apart from the I/O that restarts
//! workloads.
//!
//! ```text
//! Idle -> RestartingPlatformWorkloads -> RestartingCustomerWorkloads(0..n) -> Done
//!                    |                                  |
//!                    v                                  v
//!          PlatformRestartFailed             CustomerRestartDegraded
//! ```
//!
//! Any running state may end in `Cancelled`.

use crate::cluster::WorkloadRef;
use crate::error::WorkloadFailure;
use std::fmt;
use thiserror::Error;

/// Which group of workloads a restart phase covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPhase {
    /// Workloads in the operator's own managed namespaces
    PlatformWorkloads,
    /// Every other sidecar-injected workload
    CustomerWorkloads,
}

impl RestartPhase {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPhase::PlatformWorkloads => "platform",
            RestartPhase::CustomerWorkloads => "customer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartState {
    Idle,
    RestartingPlatformWorkloads,
    RestartingCustomerWorkloads { chunk: usize },
    Done,
    PlatformRestartFailed,
    CustomerRestartDegraded,
    Cancelled,
}

impl RestartState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RestartState::Done
                | RestartState::PlatformRestartFailed
                | RestartState::CustomerRestartDegraded
                | RestartState::Cancelled
        )
    }

    /// Next state after a phase outcome
    pub fn transition(self, outcome: PhaseOutcome) -> Result<RestartState, InvalidTransition> {
        use PhaseOutcome as O;
        use RestartState as S;

        let next = match (self, outcome) {
            (S::Idle, O::Triggered) => S::RestartingPlatformWorkloads,
            (S::RestartingPlatformWorkloads, O::PlatformRestarted) => {
                S::RestartingCustomerWorkloads { chunk: 0 }
            }
            (S::RestartingPlatformWorkloads, O::PlatformFailed) => S::PlatformRestartFailed,
            (S::RestartingCustomerWorkloads { chunk }, O::ChunkCompleted) => {
                S::RestartingCustomerWorkloads { chunk: chunk + 1 }
            }
            (S::RestartingCustomerWorkloads { .. }, O::CustomerFinished { degraded: false }) => {
                S::Done
            }
            (S::RestartingCustomerWorkloads { .. }, O::CustomerFinished { degraded: true }) => {
                S::CustomerRestartDegraded
            }
            (state, O::Cancelled) if !state.is_terminal() => S::Cancelled,
            (state, outcome) => return Err(InvalidTransition { state, outcome }),
        };
        Ok(next)
    }
}

impl fmt::Display for RestartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartState::Idle => f.write_str("Idle"),
            RestartState::RestartingPlatformWorkloads => f.write_str("RestartingPlatformWorkloads"),
            RestartState::RestartingCustomerWorkloads { chunk } => {
                write!(f, "RestartingCustomerWorkloads({chunk})")
            }
            RestartState::Done => f.write_str("Done"),
            RestartState::PlatformRestartFailed => f.write_str("PlatformRestartFailed"),
            RestartState::CustomerRestartDegraded => f.write_str("CustomerRestartDegraded"),
            RestartState::Cancelled => f.write_str("Cancelled"),
        }
    }
}

/// What a step of the rollout reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Triggered,
    PlatformRestarted,
    PlatformFailed,
    ChunkCompleted,
    CustomerFinished { degraded: bool },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid restart transition from {state} on {outcome:?}")]
pub struct InvalidTransition {
    pub state: RestartState,
    pub outcome: PhaseOutcome,
}

/// Work list of one restart phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPlan {
    pub phase: RestartPhase,
    pub chunk_size: usize,
    pub chunk_index: usize,
    pub targets: Vec<WorkloadRef>,
    pub failures: Vec<WorkloadFailure>,
}

impl RestartPlan {
    /// A zero chunk size is treated as one
    pub fn new(phase: RestartPhase, targets: Vec<WorkloadRef>, chunk_size: usize) -> Self {
        Self {
            phase,
            chunk_size: chunk_size.max(1),
            chunk_index: 0,
            targets,
            failures: Vec::new(),
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.targets.len().div_ceil(self.chunk_size)
    }

    /// Workloads of chunk `index`; empty past the end
    pub fn chunk(&self, index: usize) -> &[WorkloadRef] {
        let start = index.saturating_mul(self.chunk_size).min(self.targets.len());
        let end = start.saturating_add(self.chunk_size).min(self.targets.len());
        &self.targets[start..end]
    }

    /// Workloads of the chunk at `chunk_index`
    pub fn current_chunk(&self) -> &[WorkloadRef] {
        self.chunk(self.chunk_index)
    }

    pub fn record_failure(&mut self, workload: WorkloadRef, error: impl Into<String>) {
        self.failures.push(WorkloadFailure {
            workload,
            error: error.into(),
        });
    }

    pub fn restarted(&self) -> usize {
        self.targets.len() - self.failures.len()
    }
}
