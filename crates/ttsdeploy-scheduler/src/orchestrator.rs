//! Dependency-ordered build and start

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use ttsdeploy_core::{Capability, DeployResult, ServiceDescriptor, ServicePhase};
use ttsdeploy_runtime::{Launch, Runtime};

use crate::board::{DependencyState, StatusBoard};
use crate::cancel::Cancellation;
use crate::graph::ResolvedGraph;
use crate::reservation::Reservation;

/// Builds and starts the services of a resolved graph
///
/// Every service runs as its own future. Builds begin immediately; a start
/// waits until each dependency has reached `Starting`. A failure only
/// affects the failing service and its transitive dependents.
pub struct Orchestrator {
    runtime: Arc<dyn Runtime>,
    project: String,
    network: String,
}

impl Orchestrator {
    pub fn new(runtime: Arc<dyn Runtime>, project: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            runtime,
            project: project.into(),
            network: network.into(),
        }
    }

    /// Process every service of `graph`, recording progress on `board`
    ///
    /// Only a failure to prepare the shared network is returned as an
    /// error; per-service failures end up on the board.
    pub async fn run(
        &self,
        graph: &ResolvedGraph,
        capability: Capability,
        board: &StatusBoard,
        cancel: &Cancellation,
    ) -> DeployResult<()> {
        if cancel.is_cancelled() {
            info!("Run cancelled before orchestration");
            return Ok(());
        }

        self.runtime.ensure_network(&self.network).await?;

        join_all(
            graph
                .services()
                .iter()
                .map(|service| self.run_service(service, capability, board, cancel)),
        )
        .await;

        let snapshot = board.snapshot();
        info!(
            started = snapshot.iter().filter(|s| s.phase.has_started()).count(),
            failed = snapshot.iter().filter(|s| s.phase == ServicePhase::Failed).count(),
            pending = snapshot.iter().filter(|s| s.phase == ServicePhase::Pending).count(),
            "Orchestration finished"
        );

        Ok(())
    }

    async fn run_service(
        &self,
        service: &ServiceDescriptor,
        capability: Capability,
        board: &StatusBoard,
        cancel: &Cancellation,
    ) {
        let name = service.name.as_str();
        if cancel.is_cancelled() {
            debug!(service = name, "Skipping service, run cancelled");
            return;
        }

        if service.build.is_some() {
            board.transition(name, ServicePhase::Building);
            if let Err(e) = self.runtime.build_image(service, &self.project).await {
                error!(service = name, error = %e, "Build failed");
                board.fail(name, e.to_string());
                return;
            }
            board.mark_built(name);
            debug!(
                service = name,
                dependencies = service.depends_on.len(),
                "Build finished"
            );
        }

        for dependency in &service.depends_on {
            match board.wait_started(dependency, cancel).await {
                DependencyState::Started => {}
                DependencyState::Failed => {
                    warn!(service = name, dependency = %dependency, "Dependency failed, not starting");
                    board.fail(name, format!("dependency '{}' failed", dependency));
                    return;
                }
                DependencyState::Interrupted => {
                    Self::interrupted(board, name);
                    return;
                }
            }
        }

        if cancel.is_cancelled() {
            Self::interrupted(board, name);
            return;
        }

        let reservation = Reservation::for_service(service, capability);
        let launch = Launch {
            project: self.project.clone(),
            network: self.network.clone(),
            gpu: reservation.gpu,
        };

        match self.runtime.start_service(service, &launch).await {
            Ok(container_id) => {
                board.update(name, |s| s.degraded = reservation.degraded);
                board.mark_starting(name, container_id);
            }
            Err(e) => {
                error!(service = name, error = %e, "Start failed");
                board.fail(name, e.to_string());
            }
        }
    }

    /// A service that never started because the run was cancelled
    fn interrupted(board: &StatusBoard, name: &str) {
        debug!(service = name, "Not starting, run cancelled");
        board.update(name, |s| s.last_error = Some("interrupted before start".to_string()));
        if board.get(name).map(|s| s.phase) == Some(ServicePhase::Building) {
            board.transition(name, ServicePhase::Pending);
        }
    }
}
