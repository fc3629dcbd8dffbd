//! CLI commands implementation

use anyhow::Result;
use serde::{Deserialize, Serialize};
use ttsdeploy_core::{
    detect_gpus, DeployError, Outcome, Profile, RunReport, ServiceDescriptor, ServicePhase,
    ServiceStatus,
};
use ttsdeploy_scheduler::{Cancellation, Pipeline};

/// API client for communicating with the daemon
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Status response from the daemon
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub finished: bool,
    pub outcome: Option<Outcome>,
    pub exit_code: Option<i32>,
    pub report: RunReport,
}

/// Print a fatal error with its remediation hint, returning the exit code
fn fatal(err: &DeployError) -> i32 {
    eprintln!("Error: {}", err);
    if let Some(hint) = err.remediation() {
        eprintln!("{}", hint);
    }
    Outcome::for_error(err).code()
}

/// Deploy the stack in the foreground
pub async fn up(pipeline: &Pipeline, profile: Profile, json: bool) -> Result<i32> {
    let run = match pipeline.prepare(profile).await {
        Ok(run) => run,
        Err(e) => return Ok(fatal(&e)),
    };

    if !json {
        println!(
            "Deploying profile '{}' ({} services, {})",
            profile,
            run.graph().services().len(),
            run.capability()
        );
    }

    let cancel = Cancellation::new();
    let execution = run.execute(&cancel);
    tokio::pin!(execution);

    let result = tokio::select! {
        result = &mut execution => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted: no further builds or starts, running containers are left in place");
            cancel.cancel();
            execution.await
        }
    };

    match result {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
                println!();
                println!(
                    "Result: {} (exit code {})",
                    report.outcome(),
                    report.exit_code()
                );
            }
            Ok(report.exit_code())
        }
        Err(e) => Ok(fatal(&e)),
    }
}

/// Run the pre-flight checks and validate the profile's graph
pub async fn check(pipeline: &Pipeline, profile: Profile) -> Result<i32> {
    let preflight = match pipeline.preflight().await {
        Ok(preflight) => preflight,
        Err(e) => return Ok(fatal(&e)),
    };

    println!("Assets: {} checked, all required present", pipeline.config().assets.len());
    for created in &preflight.validation.created {
        println!("  created {}", created.display());
    }
    for skipped in &preflight.validation.skipped {
        println!("  optional {}", skipped);
    }
    println!("Toolchain: docker {}", preflight.toolchain);
    println!("Capability: {}", preflight.capability);

    match pipeline.resolve(profile) {
        Ok(graph) => {
            println!("Profile '{}': {}", profile, graph.names().join(", "));
            Ok(Outcome::Ready.code())
        }
        Err(e) => Ok(fatal(&e)),
    }
}

/// Remove the containers of a profile
pub async fn down(pipeline: &Pipeline, profile: Profile) -> Result<i32> {
    let results = match pipeline.teardown(profile).await {
        Ok(results) => results,
        Err(e) => return Ok(fatal(&e)),
    };

    let mut failed = 0;
    for result in &results {
        match &result.error {
            None => println!("Removed {}", result.service),
            Some(error) => {
                failed += 1;
                eprintln!("Failed to remove {}: {}", result.service, error);
            }
        }
    }

    Ok(if failed == 0 { 0 } else { Outcome::Degraded.code() })
}

/// Resolved service entry printed by `config`
#[derive(Debug, Serialize)]
struct ResolvedService<'a> {
    #[serde(flatten)]
    service: &'a ServiceDescriptor,
    image_ref: String,
    container: String,
}

/// Print the profile's services in dependency order
pub fn config(pipeline: &Pipeline, profile: Profile) -> Result<i32> {
    let graph = match pipeline.resolve(profile) {
        Ok(graph) => graph,
        Err(e) => return Ok(fatal(&e)),
    };

    let project = &pipeline.config().project.name;
    let services: Vec<ResolvedService> = graph
        .services()
        .iter()
        .map(|service| ResolvedService {
            service,
            image_ref: service.image_ref(project),
            container: service.container_name(project),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&services)?);
    Ok(0)
}

/// Show GPU information
pub async fn gpus() -> Result<()> {
    let gpu_info = tokio::task::spawn_blocking(detect_gpus).await?;

    println!("GPUs: {} total", gpu_info.total_count);

    if !gpu_info.devices.is_empty() {
        println!();
        for device in gpu_info.devices {
            let mem_total = device.memory_total / (1024 * 1024 * 1024);
            let mem_free = device.memory_free / (1024 * 1024 * 1024);
            let utilization = device
                .utilization
                .map(|u| format!("{}%", u))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "[{}] {} - {}/{}GB free - {} busy",
                device.index, device.name, mem_free, mem_total, utilization
            );
        }
    }

    Ok(())
}

/// Show the status reported by a running daemon
pub async fn status(client: &ApiClient) -> Result<i32> {
    let response = client
        .client
        .get(client.url("/api/v1/status"))
        .send()
        .await?;

    if response.status().is_success() {
        let status: StatusResponse = response.json().await?;

        println!("ttsdeployd v{}", status.version);
        println!();
        print_report(&status.report);
        println!();
        match (status.outcome, status.exit_code) {
            (Some(outcome), Some(code)) if status.finished => {
                println!("Result: {} (exit code {})", outcome, code);
                Ok(code)
            }
            _ => {
                println!("Run in progress");
                Ok(0)
            }
        }
    } else {
        let error = response.text().await?;
        eprintln!("Failed to get status: {}", error);
        Ok(1)
    }
}

fn detail(status: &ServiceStatus) -> String {
    let mut parts = Vec::new();
    if status.phase == ServicePhase::Building && status.built_at.is_some() {
        parts.push("built, waiting for dependencies".to_string());
    }
    if status.degraded {
        parts.push("cpu-only".to_string());
    }
    if let Some(error) = &status.last_error {
        parts.push(error.clone());
    }
    parts.join("; ")
}

/// Helper to print a run report
fn print_report(report: &RunReport) {
    println!("Run: {}", report.run_id);
    println!("  Profile: {}", report.profile);
    println!("  Capability: {}", report.capability);
    println!();
    println!(
        "{:<16} {:<10} {:<9} {:<8} {}",
        "SERVICE", "PHASE", "READY", "CHECKS", "DETAIL"
    );
    println!("{}", "-".repeat(72));
    for status in &report.services {
        println!(
            "{:<16} {:<10} {:<9} {:<8} {}",
            status.name,
            status.phase.to_string(),
            if status.is_ready() { "yes" } else { "no" },
            status.health_attempts,
            detail(status)
        );
    }
}
