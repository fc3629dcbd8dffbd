//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;
use ttsdeploy_core::{
    detect_gpus, Capability, GpuInfo, Outcome, PhaseTransition, RunReport, ServiceStatus,
};
use ttsdeploy_scheduler::{Cancellation, PreparedRun};

/// Application state shared across handlers
pub struct AppState {
    pub run: Arc<PreparedRun>,
    pub cancel: Cancellation,
}

/// Create the API router
pub fn create_router(run: Arc<PreparedRun>, cancel: Cancellation) -> Router {
    let state = Arc::new(AppState { run, cancel });

    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/services", get(list_services))
        .route("/api/v1/services/:name", get(get_service))
        .route("/api/v1/history", get(get_history))
        .route("/api/v1/capability", get(get_capability))
        .route("/api/v1/gpus", get(get_gpus))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run summary
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    /// Whether orchestration and health verification have completed
    pub finished: bool,
    /// Final verdict, once finished
    pub outcome: Option<Outcome>,
    pub exit_code: Option<i32>,
    pub report: RunReport,
}

/// Get the run summary
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let report = state.run.report(&state.cancel);
    let finished = state.run.is_finished();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        finished,
        outcome: finished.then(|| report.outcome()),
        exit_code: finished.then(|| report.exit_code()),
        report,
    })
}

/// List every active service in dependency order
async fn list_services(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceStatus>> {
    Json(state.run.board().snapshot())
}

/// Get one service
async fn get_service(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ServiceStatus>, (StatusCode, String)> {
    state.run.board().get(&name).map(Json).ok_or_else(|| {
        debug!(service = %name, "Unknown service requested");
        (
            StatusCode::NOT_FOUND,
            format!("Service '{}' is not active in this run", name),
        )
    })
}

/// Phase changes so far, oldest first
async fn get_history(State(state): State<Arc<AppState>>) -> Json<Vec<PhaseTransition>> {
    Json(state.run.board().history())
}

/// Capability response
#[derive(Debug, Serialize, Deserialize)]
pub struct CapabilityResponse {
    #[serde(flatten)]
    pub capability: Capability,
    /// Container toolchain version
    pub toolchain: String,
}

/// Get the capability detected for this run
async fn get_capability(State(state): State<Arc<AppState>>) -> Json<CapabilityResponse> {
    let preflight = state.run.preflight();
    Json(CapabilityResponse {
        capability: preflight.capability,
        toolchain: preflight.toolchain.clone(),
    })
}

/// Get GPU information
async fn get_gpus() -> Result<Json<GpuInfo>, (StatusCode, String)> {
    let gpu_info = tokio::task::spawn_blocking(detect_gpus)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(gpu_info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;
    use ttsdeploy_core::{
        DeployConfig, DeployResult, HealthCheckSpec, ServiceDescriptor, ServicePhase,
    };
    use ttsdeploy_network::HealthProbe;
    use ttsdeploy_runtime::{Launch, Runtime};
    use ttsdeploy_scheduler::Pipeline;

    struct StubRuntime;

    #[async_trait]
    impl Runtime for StubRuntime {
        async fn check_toolchain(&self) -> DeployResult<String> {
            Ok("24.0.7".to_string())
        }

        async fn gpu_support(&self) -> DeployResult<bool> {
            Ok(false)
        }

        async fn ensure_network(&self, _network: &str) -> DeployResult<()> {
            Ok(())
        }

        async fn build_image(&self, _service: &ServiceDescriptor, _project: &str) -> DeployResult<()> {
            Ok(())
        }

        async fn start_service(
            &self,
            service: &ServiceDescriptor,
            _launch: &Launch,
        ) -> DeployResult<String> {
            Ok(format!("{}-id", service.name))
        }

        async fn stop_service(&self, _service: &ServiceDescriptor, _project: &str) -> DeployResult<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    struct AlwaysHealthy;

    #[async_trait]
    impl HealthProbe for AlwaysHealthy {
        async fn probe(&self, _url: &str) -> DeployResult<()> {
            Ok(())
        }
    }

    async fn prepared() -> Arc<PreparedRun> {
        let mut check = HealthCheckSpec::new("http://127.0.0.1:7860/");
        check.start_period_secs = 0;
        let config = DeployConfig {
            assets: Vec::new(),
            services: vec![ServiceDescriptor::from_build("indextts", ".")
                .with_gpus(1)
                .with_health_check(check)],
            ..DeployConfig::default()
        };
        let pipeline = Pipeline::new(config, Arc::new(StubRuntime), Arc::new(AlwaysHealthy));
        Arc::new(
            pipeline
                .prepare(ttsdeploy_core::Profile::Basic)
                .await
                .map_err(|e| e.to_string())
                .unwrap(),
        )
    }

    async fn get_json<T: DeserializeOwned>(router: Router, uri: &str) -> (StatusCode, Option<T>) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).ok())
    }

    #[tokio::test]
    async fn test_status_before_and_after_run() {
        let run = prepared().await;
        let cancel = Cancellation::new();

        let (code, status) =
            get_json::<StatusResponse>(create_router(run.clone(), cancel.clone()), "/api/v1/status")
                .await;
        assert_eq!(code, StatusCode::OK);
        let status = status.unwrap();
        assert!(!status.finished);
        assert!(status.outcome.is_none());
        assert_eq!(status.report.services[0].phase, ServicePhase::Pending);

        run.execute(&cancel).await.unwrap();

        let (_, status) =
            get_json::<StatusResponse>(create_router(run, cancel), "/api/v1/status").await;
        let status = status.unwrap();
        assert!(status.finished);
        assert_eq!(status.outcome, Some(Outcome::Ready));
        assert_eq!(status.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_services_and_history() {
        let run = prepared().await;
        let cancel = Cancellation::new();
        run.execute(&cancel).await.unwrap();
        let router = create_router(run, cancel);

        let (_, services) = get_json::<Vec<ServiceStatus>>(router.clone(), "/api/v1/services").await;
        let services = services.unwrap();
        assert_eq!(services.len(), 1);
        assert!(services[0].degraded);

        let (code, service) =
            get_json::<ServiceStatus>(router.clone(), "/api/v1/services/indextts").await;
        assert_eq!(code, StatusCode::OK);
        let service = service.unwrap();
        assert_eq!(service.phase, ServicePhase::Healthy);
        assert!(service.built_at.is_some());

        let (_, history) = get_json::<Vec<PhaseTransition>>(router, "/api/v1/history").await;
        let phases: Vec<ServicePhase> = history.unwrap().into_iter().map(|t| t.phase).collect();
        assert_eq!(
            phases,
            vec![ServicePhase::Building, ServicePhase::Starting, ServicePhase::Healthy]
        );
    }

    #[tokio::test]
    async fn test_unknown_service_is_not_found() {
        let router = create_router(prepared().await, Cancellation::new());
        let (code, body) = get_json::<ServiceStatus>(router, "/api/v1/services/nginx").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_capability() {
        let router = create_router(prepared().await, Cancellation::new());
        let (_, capability) = get_json::<CapabilityResponse>(router, "/api/v1/capability").await;
        let capability = capability.unwrap();
        assert!(!capability.capability.gpu_available);
        assert_eq!(capability.toolchain, "24.0.7");
    }
}
