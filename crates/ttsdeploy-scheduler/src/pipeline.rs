//! End-to-end run: pre-flight, graph resolution, orchestration, health

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use ttsdeploy_assets::{AssetValidator, ValidationReport};
use ttsdeploy_core::{Capability, DeployConfig, DeployError, DeployResult, Profile, RunReport};
use ttsdeploy_network::HealthProbe;
use ttsdeploy_runtime::{CapabilityDetector, Runtime};
use uuid::Uuid;

use crate::board::StatusBoard;
use crate::cancel::Cancellation;
use crate::graph::{ResolvedGraph, ServiceGraph};
use crate::monitor::HealthMonitor;
use crate::orchestrator::Orchestrator;

/// Result of the fail-fast gate
#[derive(Debug, Clone)]
pub struct Preflight {
    pub validation: ValidationReport,
    /// Container toolchain version
    pub toolchain: String,
    pub capability: Capability,
}

/// Outcome of removing one service's container
#[derive(Debug, Clone)]
pub struct TeardownResult {
    pub service: String,
    pub error: Option<String>,
}

/// Deployment pipeline over one configuration
pub struct Pipeline {
    config: DeployConfig,
    runtime: Arc<dyn Runtime>,
    probe: Arc<dyn HealthProbe>,
}

impl Pipeline {
    /// `config` paths must already be resolved against the project root
    pub fn new(config: DeployConfig, runtime: Arc<dyn Runtime>, probe: Arc<dyn HealthProbe>) -> Self {
        Self {
            config,
            runtime,
            probe,
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Active services of `profile` in dependency order, without touching the host
    pub fn resolve(&self, profile: Profile) -> DeployResult<ResolvedGraph> {
        ServiceGraph::new(self.config.services.clone())?.resolve(profile)
    }

    /// Validate assets, then the toolchain, then probe GPU capability
    ///
    /// Missing assets abort before the runtime is contacted at all.
    pub async fn preflight(&self) -> DeployResult<Preflight> {
        let validation = AssetValidator::new(self.config.assets.clone()).validate().await;
        if !validation.passed() {
            return Err(DeployError::MissingAssets(validation.missing));
        }

        let toolchain = self.runtime.check_toolchain().await?;
        info!(runtime = self.runtime.name(), version = %toolchain, "Container toolchain available");

        let capability = CapabilityDetector::new(self.runtime.as_ref()).detect().await;

        Ok(Preflight {
            validation,
            toolchain,
            capability,
        })
    }

    /// Run every fatal check and set up the status board
    pub async fn prepare(&self, profile: Profile) -> DeployResult<PreparedRun> {
        let started_at = Utc::now();
        let preflight = self.preflight().await?;
        let skipped: Vec<&Path> = preflight
            .validation
            .skipped
            .iter()
            .map(|asset| asset.path.as_path())
            .collect();
        let graph = self.resolve(profile)?.without_mounts(&skipped);
        let board = Arc::new(StatusBoard::new(graph.services()));

        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            profile = %profile,
            capability = %preflight.capability,
            services = ?graph.names(),
            "Run prepared"
        );

        Ok(PreparedRun {
            run_id,
            preflight,
            graph,
            board,
            orchestrator: Orchestrator::new(
                self.runtime.clone(),
                &self.config.project.name,
                self.config.project.network_name(),
            ),
            monitor: HealthMonitor::new(self.probe.clone()),
            started_at,
            report: OnceLock::new(),
        })
    }

    /// Prepare and execute in one step
    pub async fn run(&self, profile: Profile, cancel: &Cancellation) -> DeployResult<RunReport> {
        let run = self.prepare(profile).await?;
        run.execute(cancel).await
    }

    /// Remove the containers of `profile` in reverse dependency order
    ///
    /// Never part of a run; a failure on one service does not stop the rest.
    pub async fn teardown(&self, profile: Profile) -> DeployResult<Vec<TeardownResult>> {
        let graph = self.resolve(profile)?;
        self.runtime.check_toolchain().await?;

        let mut results = Vec::with_capacity(graph.services().len());
        for service in graph.services().iter().rev() {
            let error = match self.runtime.stop_service(service, &self.config.project.name).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(service = %service.name, error = %e, "Failed to remove container");
                    Some(e.to_string())
                }
            };
            results.push(TeardownResult {
                service: service.name.clone(),
                error,
            });
        }

        Ok(results)
    }
}

/// A run that passed every fatal check
pub struct PreparedRun {
    run_id: Uuid,
    preflight: Preflight,
    graph: ResolvedGraph,
    board: Arc<StatusBoard>,
    orchestrator: Orchestrator,
    monitor: HealthMonitor,
    started_at: DateTime<Utc>,
    report: OnceLock<RunReport>,
}

impl PreparedRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn preflight(&self) -> &Preflight {
        &self.preflight
    }

    pub fn capability(&self) -> Capability {
        self.preflight.capability
    }

    pub fn graph(&self) -> &ResolvedGraph {
        &self.graph
    }

    /// Live status, readable while the run progresses
    pub fn board(&self) -> Arc<StatusBoard> {
        self.board.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.report.get().is_some()
    }

    /// The final report once finished, otherwise a snapshot of the board
    pub fn report(&self, cancel: &Cancellation) -> RunReport {
        if let Some(report) = self.report.get() {
            return report.clone();
        }
        RunReport {
            run_id: self.run_id,
            profile: self.graph.profile(),
            capability: self.preflight.capability,
            services: self.board.snapshot(),
            interrupted: cancel.is_cancelled(),
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }

    /// Build and start every service, then verify health
    pub async fn execute(&self, cancel: &Cancellation) -> DeployResult<RunReport> {
        self.orchestrator
            .run(&self.graph, self.preflight.capability, &self.board, cancel)
            .await?;

        if !cancel.is_cancelled() {
            self.monitor.run(&self.graph, &self.board, cancel).await;
        }

        let report = self.report(cancel);
        info!(
            run_id = %report.run_id,
            outcome = %report.outcome(),
            exit_code = report.exit_code(),
            "Run finished"
        );
        Ok(self.report.get_or_init(|| report).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Behaviour, Call, FakeProbe, FakeRuntime};
    use tempfile::TempDir;
    use ttsdeploy_core::{Outcome, ServiceDescriptor, ServicePhase, ServiceTag};

    const MODEL_FILES: [&str; 4] = ["gpt.pth", "bpe.model", "bigvgan_generator.pth", "config.yaml"];

    fn populated_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let checkpoints = dir.path().join("checkpoints");
        std::fs::create_dir_all(&checkpoints).unwrap();
        for file in MODEL_FILES {
            std::fs::write(checkpoints.join(file), b"weights").unwrap();
        }
        dir
    }

    fn fast_health_checks(config: &mut DeployConfig) {
        for service in &mut config.services {
            if let Some(check) = service.health_check.as_mut() {
                check.start_period_secs = 0;
                check.interval_secs = 1;
                check.timeout_secs = 1;
            }
        }
    }

    /// Built-in stack rooted at a populated temporary project
    fn project() -> (TempDir, DeployConfig) {
        let dir = populated_dir();
        let mut config = DeployConfig::default();
        config.resolve_paths(dir.path());
        fast_health_checks(&mut config);
        (dir, config)
    }

    fn pipeline(config: DeployConfig, runtime: Arc<FakeRuntime>, probe: Arc<FakeProbe>) -> Pipeline {
        Pipeline::new(config, runtime, probe)
    }

    fn remove(root: &Path, file: &str) {
        std::fs::remove_file(root.join("checkpoints").join(file)).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_basic_profile_with_gpu_is_ready() {
        let (_dir, config) = project();
        let runtime = Arc::new(FakeRuntime::new());
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));

        let report = pipeline(config, runtime.clone(), probe)
            .run(Profile::Basic, &Cancellation::new())
            .await
            .unwrap();

        assert_eq!(runtime.started(), vec!["indextts"]);
        assert_eq!(report.services.len(), 1);
        let status = report.service("indextts").unwrap();
        assert_eq!(status.phase, ServicePhase::Healthy);
        assert!(!status.degraded);
        assert!(report.capability.gpu_available);
        assert_eq!(report.outcome(), Outcome::Ready);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_config_file_keeps_inference_service() {
        let dir = populated_dir();
        std::fs::write(
            dir.path().join(ttsdeploy_core::CONFIG_FILE_NAME),
            "[api]\naddress = \"0.0.0.0\"\nport = 9000\n",
        )
        .unwrap();
        let (mut config, _) = DeployConfig::load(None, Some(dir.path())).unwrap();
        fast_health_checks(&mut config);
        let runtime = Arc::new(FakeRuntime::new());
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));

        let report = pipeline(config, runtime.clone(), probe)
            .run(Profile::Basic, &Cancellation::new())
            .await
            .unwrap();

        assert_eq!(runtime.started(), vec!["indextts"]);
        assert_eq!(report.service("indextts").unwrap().phase, ServicePhase::Healthy);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_config_without_core_service_is_config_error() {
        let (_dir, mut config) = project();
        config.services.retain(|s| !s.is_core());
        let runtime = Arc::new(FakeRuntime::new());
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));

        let err = pipeline(config, runtime.clone(), probe)
            .run(Profile::Full, &Cancellation::new())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, DeployError::NoCoreService(Profile::Full)));
        assert_eq!(Outcome::for_error(&err).code(), 3);
        assert!(runtime.started().is_empty());
        assert!(!runtime.calls().iter().any(|c| matches!(c, Call::Build(_))));
    }

    #[tokio::test]
    async fn test_absent_optional_asset_is_not_mounted() {
        let (dir, config) = project();
        let runtime = Arc::new(FakeRuntime::new());
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));
        let pipeline = pipeline(config, runtime, probe);
        let mounted = |run: &PreparedRun| -> bool {
            run.graph()
                .get("indextts")
                .unwrap()
                .volumes
                .iter()
                .any(|v| v.container == "/app/demos")
        };

        let run = pipeline.prepare(Profile::Basic).await.unwrap();
        assert_eq!(run.preflight().validation.skipped.len(), 1);
        assert!(!mounted(&run));
        assert!(!dir.path().join("demos").exists());

        std::fs::create_dir(dir.path().join("demos")).unwrap();
        let run = pipeline.prepare(Profile::Basic).await.unwrap();
        assert!(run.preflight().validation.skipped.is_empty());
        assert!(mounted(&run));
    }

    #[tokio::test]
    async fn test_missing_checkpoint_aborts_before_runtime() {
        let (dir, config) = project();
        remove(dir.path(), "gpt.pth");
        let runtime = Arc::new(FakeRuntime::new());
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));

        let err = match pipeline(config, runtime.clone(), probe.clone())
            .run(Profile::Full, &Cancellation::new())
            .await
        {
            Ok(_) => panic!("run should fail pre-flight"),
            Err(e) => e,
        };

        match &err {
            DeployError::MissingAssets(missing) => {
                let names: Vec<&str> = missing.iter().map(|m| m.name.as_str()).collect();
                assert_eq!(names, vec!["gpt.pth"]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.remediation().unwrap().contains("gpt.pth"));
        assert_eq!(Outcome::for_error(&err).code(), 2);
        assert!(runtime.calls().is_empty());
        assert_eq!(probe.total_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cpu_only_host_runs_degraded() {
        let (_dir, config) = project();
        let runtime = Arc::new(FakeRuntime::new().without_gpu());
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));

        let report = pipeline(config, runtime.clone(), probe)
            .run(Profile::Basic, &Cancellation::new())
            .await
            .unwrap();

        assert!(!report.capability.gpu_available);
        let status = report.service("indextts").unwrap();
        assert!(status.degraded);
        assert_eq!(status.phase, ServicePhase::Healthy);
        assert_eq!(report.exit_code(), 0);
        assert!(runtime.calls().contains(&Call::Start(
            "indextts".to_string(),
            ttsdeploy_runtime::GpuRequest::None
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_proxy_build_failure_is_partial() {
        let (_dir, config) = project();
        let runtime = Arc::new(FakeRuntime::new().failing_build("nginx"));
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));

        let report = pipeline(config, runtime, probe)
            .run(Profile::Full, &Cancellation::new())
            .await
            .unwrap();

        assert_eq!(report.services.len(), 4);
        assert_eq!(report.service("nginx").unwrap().phase, ServicePhase::Failed);
        for healthy in ["indextts", "prometheus", "grafana"] {
            assert_eq!(report.service(healthy).unwrap().phase, ServicePhase::Healthy);
        }
        assert_eq!(report.outcome(), Outcome::Degraded);
        assert_eq!(report.exit_code(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_service_degrades_run() {
        let (_dir, config) = project();
        let runtime = Arc::new(FakeRuntime::new());
        let probe = Arc::new(FakeProbe::new(Behaviour::Refuse));

        let report = pipeline(config, runtime.clone(), probe.clone())
            .run(Profile::Basic, &Cancellation::new())
            .await
            .unwrap();

        let status = report.service("indextts").unwrap();
        assert_eq!(status.phase, ServicePhase::Unhealthy);
        assert_eq!(status.health_attempts, 3);
        assert_eq!(report.exit_code(), 4);
        assert!(!runtime.calls().iter().any(|c| matches!(c, Call::Stop(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_metrics_leave_inference_ready() {
        let (_dir, config) = project();
        let runtime = Arc::new(FakeRuntime::new());
        let probe = Arc::new(
            FakeProbe::new(Behaviour::Healthy)
                .with("http://127.0.0.1:9090/-/healthy", Behaviour::Refuse),
        );

        let report = pipeline(config, runtime.clone(), probe.clone())
            .run(Profile::Full, &Cancellation::new())
            .await
            .unwrap();

        let prometheus = report.service("prometheus").unwrap();
        assert_eq!(prometheus.phase, ServicePhase::Unhealthy);
        assert!(prometheus.last_error.as_deref().unwrap().contains("connection refused"));
        assert_eq!(probe.attempts("http://127.0.0.1:9090/-/healthy"), 3);

        for ready in ["indextts", "grafana"] {
            assert_eq!(report.service(ready).unwrap().phase, ServicePhase::Healthy);
        }
        assert_eq!(probe.attempts("http://127.0.0.1:7860/"), 1);
        assert_eq!(report.service("nginx").unwrap().phase, ServicePhase::Starting);
        assert_eq!(report.exit_code(), 4);
        assert_eq!(runtime.started().len(), 4);
    }

    #[tokio::test]
    async fn test_dependency_outside_profile_is_config_error() {
        let (_dir, mut config) = project();
        config.services.push(
            ServiceDescriptor::from_image("alertmanager", "prom/alertmanager")
                .with_tag(ServiceTag::Monitoring)
                .with_dependency("nginx"),
        );
        let runtime = Arc::new(FakeRuntime::new());
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));

        let err = pipeline(config, runtime.clone(), probe)
            .prepare(Profile::WithMonitoring)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, DeployError::DependencyOutsideProfile { .. }));
        assert_eq!(Outcome::for_error(&err), Outcome::ConfigInvalid);
        assert!(runtime.started().is_empty());
        assert!(!runtime.calls().iter().any(|c| matches!(c, Call::Build(_))));
    }

    #[tokio::test]
    async fn test_missing_toolchain_is_preflight_error() {
        let (_dir, config) = project();
        let runtime = Arc::new(FakeRuntime::new().without_toolchain());
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));

        let err = pipeline(config, runtime.clone(), probe)
            .prepare(Profile::Basic)
            .await
            .err()
            .unwrap();

        assert!(err.is_preflight());
        assert_eq!(Outcome::for_error(&err).code(), 2);
        assert_eq!(runtime.calls(), vec![Call::Toolchain]);
    }

    #[tokio::test]
    async fn test_interrupted_run_leaves_services_alone() {
        let (_dir, config) = project();
        let runtime = Arc::new(FakeRuntime::new());
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));
        let cancel = Cancellation::new();

        let run = pipeline(config, runtime.clone(), probe.clone())
            .prepare(Profile::Full)
            .await
            .unwrap();
        assert!(!run.is_finished());
        cancel.cancel();
        let report = run.execute(&cancel).await.unwrap();

        assert!(run.is_finished());
        assert_eq!(report.outcome(), Outcome::Interrupted);
        assert_eq!(report.exit_code(), 130);
        assert_eq!(report.count(ServicePhase::Pending), 4);
        assert!(runtime.started().is_empty());
        assert_eq!(probe.total_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_while_running_and_after() {
        let (_dir, config) = project();
        let runtime = Arc::new(FakeRuntime::new());
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));
        let cancel = Cancellation::new();

        let run = pipeline(config, runtime, probe)
            .prepare(Profile::Basic)
            .await
            .unwrap();
        let live = run.report(&cancel);
        assert_eq!(live.services[0].phase, ServicePhase::Pending);

        let report = run.execute(&cancel).await.unwrap();
        assert_eq!(run.report(&cancel).finished_at, report.finished_at);
        assert_eq!(run.board().get("indextts").unwrap().phase, ServicePhase::Healthy);
    }

    #[tokio::test]
    async fn test_teardown_reverse_order() {
        let (_dir, config) = project();
        let runtime = Arc::new(FakeRuntime::new());
        let probe = Arc::new(FakeProbe::new(Behaviour::Healthy));

        let results = pipeline(config, runtime.clone(), probe)
            .teardown(Profile::Full)
            .await
            .unwrap();

        let removed: Vec<&str> = results.iter().map(|r| r.service.as_str()).collect();
        assert_eq!(removed, vec!["grafana", "nginx", "prometheus", "indextts"]);
        assert!(results.iter().all(|r| r.error.is_none()));
        assert_eq!(
            runtime.calls().last(),
            Some(&Call::Stop("indextts".to_string()))
        );
    }
}
