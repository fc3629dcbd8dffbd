//! ttsdeploy daemon
//!
//! Runs one deployment and keeps serving its status API until interrupted.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use ttsdeploy_api::create_router;
use ttsdeploy_core::{DeployConfig, Outcome, Profile};
use ttsdeploy_network::HealthChecker;
use ttsdeploy_runtime::{DockerRuntime, DockerRuntimeConfig};
use ttsdeploy_scheduler::{Cancellation, Pipeline};

/// ttsdeploy daemon - deploys the IndexTTS stack and reports its status
#[derive(Parser, Debug)]
#[command(name = "ttsdeployd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Deployment file (defaults to ttsdeploy.toml in the project directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project root that relative host paths resolve against
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Deployment mode: basic, with-proxy, with-monitoring or full
    #[arg(long, default_value = "basic")]
    profile: String,

    /// Address to bind the status API (overrides the config file)
    #[arg(long)]
    address: Option<String>,

    /// Port for the status API (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Path to the docker binary
    #[arg(long, default_value = "docker")]
    docker: PathBuf,
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false);

    let result = if format.eq_ignore_ascii_case("json") {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    if let Err(e) = result {
        eprintln!("Failed to set subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (config, root) = DeployConfig::load(args.config.as_deref(), args.project_dir.as_deref())
        .context("Failed to load configuration")?;
    init_logging(
        args.log_level.as_deref().unwrap_or(&config.logging.level),
        &config.logging.format,
    );

    info!("Starting ttsdeploy daemon v{}", env!("CARGO_PKG_VERSION"));
    info!(root = %root.display(), "Project directory");

    let profile = Profile::select(&args.profile);
    let address = args.address.clone().unwrap_or_else(|| config.api.address.clone());
    let port = args.port.unwrap_or(config.api.port);

    let probe_timeout = config
        .services
        .iter()
        .filter_map(|s| s.health_check.as_ref().map(|h| h.timeout()))
        .max()
        .unwrap_or(Duration::from_secs(10));
    let runtime = Arc::new(DockerRuntime::new(DockerRuntimeConfig {
        docker_path: args.docker.clone(),
        ..DockerRuntimeConfig::default()
    }));
    let probe = Arc::new(HealthChecker::new(probe_timeout)?);
    let pipeline = Pipeline::new(config, runtime, probe);

    let run = match pipeline.prepare(profile).await {
        Ok(run) => Arc::new(run),
        Err(e) => {
            error!(error = %e, "Deployment aborted before any service started");
            if let Some(hint) = e.remediation() {
                eprintln!("{}", hint);
            }
            std::process::exit(Outcome::for_error(&e).code());
        }
    };
    let cancel = Cancellation::new();

    let addr: SocketAddr = format!("{}:{}", address, port)
        .parse()
        .with_context(|| format!("Invalid API address {}:{}", address, port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Status API listening on {}", addr);

    let router = create_router(run.clone(), cancel.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "Status API stopped");
        }
    });

    let mut execution = {
        let run = run.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { run.execute(&cancel).await })
    };

    let finished = tokio::select! {
        result = &mut execution => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupt received, no further builds or starts; running containers are left in place");
            cancel.cancel();
            (&mut execution).await
        }
    };

    let code = match finished {
        Ok(Ok(report)) => {
            info!(
                outcome = %report.outcome(),
                ready = report.services.iter().filter(|s| s.is_ready()).count(),
                total = report.services.len(),
                "Deployment finished"
            );
            report.exit_code()
        }
        Ok(Err(e)) => {
            error!(error = %e, "Deployment failed");
            Outcome::for_error(&e).code()
        }
        Err(e) => {
            error!(error = %e, "Deployment task panicked");
            1
        }
    };

    if cancel.is_cancelled() {
        std::process::exit(code);
    }

    info!("Serving status until interrupted; use `ttsdeploy down` to remove the stack");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for interrupt")?;
    info!("Shutting down status API");

    std::process::exit(code);
}
