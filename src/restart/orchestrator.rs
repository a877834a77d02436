//! # Sidecar Restart Orchestrator
//!
//! Rolls a proxy change out to running workloads in two phases.
//!
//! Platform workloads go first and must all succeed; a failure there means the mesh
//! itself may be unhealthy, so customer workloads are left alone. Customer workloads
//! are then restarted chunk by chunk, sequentially. A failing customer workload is
//! recorded and the rollout moves on.

use super::state::{InvalidTransition, PhaseOutcome, RestartPhase, RestartPlan, RestartState};
use crate::cluster::{ClusterApi, NamespaceScope, WorkloadRef, WorkloadSelector};
use crate::config::SharedOperatorConfig;
use crate::crd::Istio;
use crate::error::{
    ClusterApiError, CustomerRestartPartialFailure, PlatformRestartError, RestartFlowError,
};
use crate::observability::metrics;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of a restart run
#[derive(Debug)]
pub enum RestartOutcome {
    /// Every outdated workload was restarted
    Ready { restarted: usize },
    /// Platform phase failed; customer workloads were not touched
    Error(PlatformRestartError),
    /// Some customer workloads could not be restarted
    Warning(CustomerRestartPartialFailure),
    /// Cancellation was requested; restarts already issued stay in effect
    Cancelled,
}

impl RestartOutcome {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartOutcome::Ready { .. } => "ready",
            RestartOutcome::Error(_) => "error",
            RestartOutcome::Warning(_) => "warning",
            RestartOutcome::Cancelled => "cancelled",
        }
    }
}

/// State machine and work lists of one run
#[derive(Debug)]
struct RestartRun {
    state: RestartState,
    platform: Option<RestartPlan>,
    customer: Option<RestartPlan>,
    platform_error: Option<PlatformRestartError>,
    listing_error: Option<String>,
}

impl RestartRun {
    fn new() -> Self {
        Self {
            state: RestartState::Idle,
            platform: None,
            customer: None,
            platform_error: None,
            listing_error: None,
        }
    }

    fn advance(&mut self, outcome: PhaseOutcome) -> Result<(), InvalidTransition> {
        let next = self.state.transition(outcome)?;
        debug!(from = %self.state, to = %next, "Sidecar restart state transition");
        self.state = next;
        Ok(())
    }

    fn fail_platform(&mut self, error: PlatformRestartError) -> Result<(), InvalidTransition> {
        if error.is_cancelled() {
            return self.advance(PhaseOutcome::Cancelled);
        }
        self.platform_error = Some(error);
        self.advance(PhaseOutcome::PlatformFailed)
    }

    /// Outcome read off the terminal state
    fn finish(self) -> Result<RestartOutcome, RestartFlowError> {
        let restarted =
            |plan: &Option<RestartPlan>| plan.as_ref().map_or(0, RestartPlan::restarted);
        match self.state {
            RestartState::Done => Ok(RestartOutcome::Ready {
                restarted: restarted(&self.platform) + restarted(&self.customer),
            }),
            RestartState::CustomerRestartDegraded => {
                Ok(RestartOutcome::Warning(CustomerRestartPartialFailure {
                    failures: self.customer.map(|plan| plan.failures).unwrap_or_default(),
                    listing_error: self.listing_error,
                }))
            }
            RestartState::PlatformRestartFailed => self
                .platform_error
                .map(RestartOutcome::Error)
                .ok_or(RestartFlowError::Incomplete(self.state)),
            RestartState::Cancelled => Ok(RestartOutcome::Cancelled),
            state => Err(RestartFlowError::Incomplete(state)),
        }
    }
}

pub struct SidecarRestartOrchestrator {
    api: Arc<dyn ClusterApi>,
    config: SharedOperatorConfig,
}

impl std::fmt::Debug for SidecarRestartOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidecarRestartOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SidecarRestartOrchestrator {
    pub fn new(api: Arc<dyn ClusterApi>, config: SharedOperatorConfig) -> Self {
        Self { api, config }
    }

    /// Chunk size for the customer phase; the CR wins over the operator default
    pub fn chunk_size(&self, istio: &Istio) -> usize {
        istio
            .spec
            .sidecar_restart
            .as_ref()
            .and_then(|r| r.chunk_size)
            .filter(|size| *size > 0)
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(self.config.restart_chunk_size)
    }

    fn platform_selector(&self) -> WorkloadSelector {
        WorkloadSelector {
            scope: NamespaceScope::Only(self.config.platform_namespaces.clone()),
            expected_proxy_image: self.config.proxy_image.clone(),
        }
    }

    fn customer_selector(&self) -> WorkloadSelector {
        let mut excluded = self.config.platform_namespaces.clone();
        excluded.push(self.config.istio_namespace.clone());
        WorkloadSelector {
            scope: NamespaceScope::AllExcept(excluded),
            expected_proxy_image: self.config.proxy_image.clone(),
        }
    }

    /// Restart every workload still running an outdated sidecar
    ///
    /// The outcome is derived from the state the rollout ends in. A step the state
    /// machine rejects aborts the run with an error.
    pub async fn run_restart(&self, istio: &Istio) -> Result<RestartOutcome, RestartFlowError> {
        let mut run = RestartRun::new();
        info!(istio = %istio.name_any(), "Restarting workloads with outdated sidecars");

        self.execute(istio, &mut run).await?;
        debug!(state = %run.state, "Sidecar restart run ended");
        let outcome = run.finish()?;

        metrics::increment_restart_runs(outcome.as_str());
        match &outcome {
            RestartOutcome::Ready { restarted } => {
                metrics::set_failed_customer_workloads(0);
                info!(restarted = restarted, "Sidecar restart finished");
            }
            RestartOutcome::Warning(partial) => {
                metrics::set_failed_customer_workloads(partial.failures.len());
                warn!("Sidecar restart degraded: {}", partial);
            }
            RestartOutcome::Error(e) => error!("Sidecar restart failed: {}", e),
            RestartOutcome::Cancelled => info!("Sidecar restart cancelled"),
        }
        Ok(outcome)
    }

    async fn execute(
        &self,
        istio: &Istio,
        run: &mut RestartRun,
    ) -> Result<(), InvalidTransition> {
        run.advance(PhaseOutcome::Triggered)?;
        self.restart_platform_workloads(run).await?;

        // customer workloads are only touched once the platform phase succeeded
        if matches!(run.state, RestartState::RestartingCustomerWorkloads { .. }) {
            self.restart_customer_workloads(istio, run).await?;
        }
        Ok(())
    }

    /// Restart platform workloads as a single chunk, stopping at the first failure
    async fn restart_platform_workloads(
        &self,
        run: &mut RestartRun,
    ) -> Result<(), InvalidTransition> {
        let targets = match self.api.list_workloads(&self.platform_selector()).await {
            Ok(targets) => targets,
            Err(e) => return run.fail_platform(PlatformRestartError::List(e)),
        };
        let chunk_size = targets.len();
        let mut plan = RestartPlan::new(RestartPhase::PlatformWorkloads, targets, chunk_size);
        info!(workloads = plan.targets.len(), "Restarting platform workloads");

        let phase = plan.phase.as_str();
        let workloads = plan.current_chunk().to_vec();
        for workload in workloads {
            if let Err(source) = self.api.restart_workload(&workload).await {
                if !source.is_cancelled() {
                    metrics::increment_workload_restart_failures(phase);
                    plan.record_failure(workload.clone(), source.to_string());
                }
                run.platform = Some(plan);
                return run.fail_platform(PlatformRestartError::Restart { workload, source });
            }
            metrics::increment_workloads_restarted(phase);
            debug!(workload = %workload, "Restarted platform workload");
        }

        run.platform = Some(plan);
        run.advance(PhaseOutcome::PlatformRestarted)
    }

    /// Restart customer workloads chunk by chunk; the state machine tracks the chunk
    async fn restart_customer_workloads(
        &self,
        istio: &Istio,
        run: &mut RestartRun,
    ) -> Result<(), InvalidTransition> {
        let targets = match self.api.list_workloads(&self.customer_selector()).await {
            Ok(targets) => targets,
            Err(e) if e.is_cancelled() => return run.advance(PhaseOutcome::Cancelled),
            Err(e) => {
                // the mesh is healthy; only the rollout could not be planned
                run.listing_error = Some(e.to_string());
                return run.advance(PhaseOutcome::CustomerFinished { degraded: true });
            }
        };

        let mut plan = RestartPlan::new(
            RestartPhase::CustomerWorkloads,
            targets,
            self.chunk_size(istio),
        );
        info!(
            workloads = plan.targets.len(),
            chunks = plan.chunk_count(),
            chunk_size = plan.chunk_size,
            "Restarting customer workloads"
        );

        while let RestartState::RestartingCustomerWorkloads { chunk } = run.state {
            if chunk >= plan.chunk_count() {
                break;
            }
            plan.chunk_index = chunk;
            let workloads = plan.current_chunk().to_vec();
            if self.restart_chunk(&mut plan, &workloads).await.is_err() {
                run.customer = Some(plan);
                return run.advance(PhaseOutcome::Cancelled);
            }
            run.advance(PhaseOutcome::ChunkCompleted)?;
            debug!(
                chunk = chunk + 1,
                of = plan.chunk_count(),
                failures = plan.failures.len(),
                "Customer workload chunk completed"
            );
        }

        let degraded = !plan.failures.is_empty();
        run.customer = Some(plan);
        run.advance(PhaseOutcome::CustomerFinished { degraded })
    }

    /// Restart one chunk; failures are recorded on the plan, only cancellation aborts
    async fn restart_chunk(
        &self,
        plan: &mut RestartPlan,
        chunk: &[WorkloadRef],
    ) -> Result<(), ClusterApiError> {
        let phase = plan.phase.as_str();
        for workload in chunk {
            match self.api.restart_workload(workload).await {
                Ok(()) => {
                    metrics::increment_workloads_restarted(phase);
                    debug!(workload = %workload, "Restarted customer workload");
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    metrics::increment_workload_restart_failures(phase);
                    warn!(workload = %workload, "Failed to restart customer workload: {}", e);
                    plan.record_failure(workload.clone(), e.to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{MockClusterApi, WorkloadKind};
    use crate::config::OperatorConfig;
    use crate::crd::{IstioSpec, SidecarRestartConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn istio(chunk_size: Option<u32>) -> Istio {
        Istio::new(
            "default",
            IstioSpec {
                sidecar_restart: chunk_size.map(|size| SidecarRestartConfig {
                    chunk_size: Some(size),
                }),
                ..Default::default()
            },
        )
    }

    fn workloads(namespace: &str, count: usize) -> Vec<WorkloadRef> {
        (0..count)
            .map(|i| WorkloadRef::new(WorkloadKind::Deployment, namespace, format!("app-{i:02}")))
            .collect()
    }

    fn is_platform(selector: &WorkloadSelector) -> bool {
        matches!(selector.scope, NamespaceScope::Only(_))
    }

    fn orchestrator(mock: MockClusterApi) -> SidecarRestartOrchestrator {
        SidecarRestartOrchestrator::new(Arc::new(mock), Arc::new(OperatorConfig::default()))
    }

    #[tokio::test]
    async fn test_platform_failure_never_touches_customer_workloads() {
        let mut mock = MockClusterApi::new();
        mock.expect_list_workloads()
            .times(1)
            .withf(is_platform)
            .returning(|_| Ok(workloads("kyma-system", 3)));
        mock.expect_restart_workload()
            .times(1)
            .returning(|_| Err(ClusterApiError::Other("conflict".to_string())));

        let outcome = orchestrator(mock).run_restart(&istio(None)).await.unwrap();
        match outcome {
            RestartOutcome::Error(PlatformRestartError::Restart { workload, .. }) => {
                assert_eq!(workload.name, "app-00");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_customer_failures_are_collected_across_chunks() {
        let mut mock = MockClusterApi::new();
        mock.expect_list_workloads().times(2).returning(|selector| {
            if is_platform(selector) {
                Ok(workloads("kyma-system", 1))
            } else {
                Ok(workloads("shop", 25))
            }
        });
        mock.expect_restart_workload()
            .times(26)
            .returning(|workload| match workload.name.as_str() {
                "app-03" | "app-21" if workload.namespace == "shop" => {
                    Err(ClusterApiError::Other("forbidden".to_string()))
                }
                _ => Ok(()),
            });

        let outcome = orchestrator(mock).run_restart(&istio(Some(10))).await.unwrap();
        let RestartOutcome::Warning(partial) = outcome else {
            panic!("expected warning, got {outcome:?}");
        };
        let names: Vec<&str> = partial
            .failed_workloads()
            .iter()
            .map(|w| w.name.as_str())
            .collect();
        assert_eq!(names, vec!["app-03", "app-21"]);
        assert!(partial.listing_error.is_none());
    }

    #[tokio::test]
    async fn test_clean_run_is_ready() {
        let mut mock = MockClusterApi::new();
        mock.expect_list_workloads().times(2).returning(|selector| {
            if is_platform(selector) {
                Ok(workloads("kyma-system", 2))
            } else {
                Ok(workloads("shop", 4))
            }
        });
        mock.expect_restart_workload().times(6).returning(|_| Ok(()));

        let outcome = orchestrator(mock).run_restart(&istio(None)).await.unwrap();
        assert!(matches!(outcome, RestartOutcome::Ready { restarted: 6 }));
    }

    #[tokio::test]
    async fn test_customer_listing_failure_is_warning() {
        let mut mock = MockClusterApi::new();
        mock.expect_list_workloads().times(2).returning(|selector| {
            if is_platform(selector) {
                Ok(vec![])
            } else {
                Err(ClusterApiError::Other("timeout".to_string()))
            }
        });
        mock.expect_restart_workload().times(0);

        let outcome = orchestrator(mock).run_restart(&istio(None)).await.unwrap();
        let RestartOutcome::Warning(partial) = outcome else {
            panic!("expected warning, got {outcome:?}");
        };
        assert!(partial.failures.is_empty());
        assert!(partial.listing_error.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_rollout() {
        let restarts = Arc::new(AtomicUsize::new(0));
        let counter = restarts.clone();
        let mut mock = MockClusterApi::new();
        mock.expect_list_workloads().returning(|selector| {
            if is_platform(selector) {
                Ok(vec![])
            } else {
                Ok(workloads("shop", 20))
            }
        });
        mock.expect_restart_workload().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) >= 4 {
                Err(ClusterApiError::Cancelled)
            } else {
                Ok(())
            }
        });

        let outcome = orchestrator(mock).run_restart(&istio(Some(3))).await.unwrap();
        assert!(matches!(outcome, RestartOutcome::Cancelled));
        assert_eq!(restarts.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_chunk_size_prefers_custom_resource() {
        let orchestrator = orchestrator(MockClusterApi::new());
        assert_eq!(orchestrator.chunk_size(&istio(Some(20))), 20);
        assert_eq!(orchestrator.chunk_size(&istio(Some(0))), 10);
        assert_eq!(orchestrator.chunk_size(&istio(None)), 10);
    }

    #[test]
    fn test_customer_scope_excludes_platform_and_mesh_namespaces() {
        let selector = orchestrator(MockClusterApi::new()).customer_selector();
        assert!(!selector.scope.contains("kyma-system"));
        assert!(!selector.scope.contains("istio-system"));
        assert!(selector.scope.contains("shop"));
    }

    #[tokio::test]
    async fn test_platform_phase_runs_as_one_chunk() {
        let mut mock = MockClusterApi::new();
        mock.expect_list_workloads()
            .times(1)
            .withf(is_platform)
            .returning(|_| Ok(workloads("kyma-system", 3)));
        mock.expect_restart_workload()
            .times(2)
            .returning(|workload| match workload.name.as_str() {
                "app-01" => Err(ClusterApiError::Other("conflict".to_string())),
                _ => Ok(()),
            });

        let mut run = RestartRun::new();
        orchestrator(mock).execute(&istio(None), &mut run).await.unwrap();

        assert_eq!(run.state, RestartState::PlatformRestartFailed);
        assert!(run.customer.is_none());
        let plan = run.platform.unwrap();
        assert_eq!(plan.phase, RestartPhase::PlatformWorkloads);
        assert_eq!(plan.chunk_count(), 1);
        assert_eq!(plan.failures.len(), 1);
        assert_eq!(plan.failures[0].workload.name, "app-01");
    }

    #[tokio::test]
    async fn test_rejected_transition_aborts_the_run() {
        let mut mock = MockClusterApi::new();
        mock.expect_list_workloads().times(0);
        mock.expect_restart_workload().times(0);

        let mut run = RestartRun::new();
        run.state = RestartState::Done;
        let err = orchestrator(mock)
            .execute(&istio(None), &mut run)
            .await
            .unwrap_err();
        assert_eq!(err.state, RestartState::Done);
        assert_eq!(err.outcome, PhaseOutcome::Triggered);
    }

    #[test]
    fn test_outcome_is_read_off_the_terminal_state() {
        let mut run = RestartRun::new();
        run.state = RestartState::RestartingCustomerWorkloads { chunk: 1 };
        assert!(matches!(
            run.finish(),
            Err(RestartFlowError::Incomplete(RestartState::RestartingCustomerWorkloads {
                chunk: 1
            }))
        ));

        let mut run = RestartRun::new();
        run.state = RestartState::Done;
        run.platform = Some(RestartPlan::new(
            RestartPhase::PlatformWorkloads,
            workloads("kyma-system", 2),
            2,
        ));
        run.customer = Some(RestartPlan::new(
            RestartPhase::CustomerWorkloads,
            workloads("shop", 5),
            2,
        ));
        assert!(matches!(
            run.finish(),
            Ok(RestartOutcome::Ready { restarted: 7 })
        ));

        let mut run = RestartRun::new();
        run.state = RestartState::CustomerRestartDegraded;
        run.listing_error = Some("timeout".to_string());
        let Ok(RestartOutcome::Warning(partial)) = run.finish() else {
            panic!("expected warning");
        };
        assert_eq!(partial.listing_error.as_deref(), Some("timeout"));

        let mut run = RestartRun::new();
        run.state = RestartState::PlatformRestartFailed;
        assert!(matches!(run.finish(), Err(RestartFlowError::Incomplete(_))));
    }
}
