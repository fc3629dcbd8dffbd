//! Bounded, retried readiness verification

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use ttsdeploy_core::{HealthCheckSpec, ServiceDescriptor, ServicePhase};
use ttsdeploy_network::HealthProbe;

use crate::board::{DependencyState, StatusBoard};
use crate::cancel::Cancellation;
use crate::graph::ResolvedGraph;

/// Polls the health endpoint of every started service that declares one
pub struct HealthMonitor {
    probe: Arc<dyn HealthProbe>,
}

impl HealthMonitor {
    pub fn new(probe: Arc<dyn HealthProbe>) -> Self {
        Self { probe }
    }

    /// Verify every health-checked service concurrently
    ///
    /// Exhausted retries leave a service `Unhealthy`; nothing is stopped.
    pub async fn run(&self, graph: &ResolvedGraph, board: &StatusBoard, cancel: &Cancellation) {
        join_all(graph.services().iter().filter_map(|service| {
            service
                .health_check
                .as_ref()
                .map(|check| self.verify(service, check, board, cancel))
        }))
        .await;
    }

    async fn verify(
        &self,
        service: &ServiceDescriptor,
        check: &HealthCheckSpec,
        board: &StatusBoard,
        cancel: &Cancellation,
    ) {
        let name = service.name.as_str();
        if board.get(name).map(|s| s.phase) != Some(ServicePhase::Starting) {
            debug!(service = name, "Not started, skipping health check");
            return;
        }

        for dependency in &service.depends_on {
            if board.wait_started(dependency, cancel).await != DependencyState::Started {
                return;
            }
        }

        let Some(since) = board.starting_since(name) else {
            return;
        };
        tokio::select! {
            _ = tokio::time::sleep_until(since + check.start_period()) => {}
            _ = cancel.cancelled() => return,
        }

        let attempts = check.retries.max(1);
        for attempt in 1..=attempts {
            let result = match tokio::time::timeout(check.timeout(), self.probe.probe(&check.url)).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!(
                    "{}: no response within {}s",
                    check.url, check.timeout_secs
                )),
            };

            match result {
                Ok(()) => {
                    board.record_attempt(name, None);
                    board.transition(name, ServicePhase::Healthy);
                    info!(service = name, attempt = attempt, "Service healthy");
                    return;
                }
                Err(e) => {
                    debug!(service = name, attempt = attempt, error = %e, "Health check failed");
                    board.record_attempt(name, Some(e));
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = tokio::time::sleep(check.interval()) => {}
                    _ = cancel.cancelled() => return,
                }
            }
        }

        warn!(
            service = name,
            attempts = attempts,
            endpoint = %check.url,
            "Health check retries exhausted, service unhealthy"
        );
        board.transition(name, ServicePhase::Unhealthy);
    }
}
