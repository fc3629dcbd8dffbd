//! ttsdeploy CLI
//!
//! Deploys the IndexTTS stack in the foreground and inspects a running daemon.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use ttsdeploy_core::{DeployConfig, Profile};
use ttsdeploy_network::HealthChecker;
use ttsdeploy_runtime::{DockerRuntime, DockerRuntimeConfig};
use ttsdeploy_scheduler::Pipeline;

/// ttsdeploy - deployment orchestrator for the IndexTTS web UI and API
#[derive(Parser, Debug)]
#[command(name = "ttsdeploy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Deployment file (defaults to ttsdeploy.toml in the project directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project root that relative host paths resolve against
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Path to the docker binary
    #[arg(long, default_value = "docker", global = true)]
    docker: PathBuf,

    /// Daemon API address
    #[arg(long, default_value = "http://localhost:7880", global = true)]
    api: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Deployment mode selection
#[derive(clap::Args, Debug, Clone)]
struct ProfileArgs {
    /// Deployment mode: basic, with-proxy, with-monitoring or full
    #[arg(long)]
    profile: Option<String>,

    /// Add the reverse proxy
    #[arg(long)]
    with_proxy: bool,

    /// Add the metrics stack
    #[arg(long)]
    with_monitoring: bool,
}

impl ProfileArgs {
    /// An explicit mode wins over the individual flags
    fn resolve(&self) -> Profile {
        match &self.profile {
            Some(mode) => Profile::select(mode),
            None => Profile::from_flags(self.with_proxy, self.with_monitoring),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate, build, start and health-check the stack
    Up {
        #[command(flatten)]
        profile: ProfileArgs,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the pre-flight checks without building anything
    Check {
        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Remove the containers of a profile
    Down {
        /// Deployment mode whose services are removed
        #[arg(long, default_value = "full")]
        profile: String,
    },

    /// Print the resolved service graph
    Config {
        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Show GPU information
    Gpus,

    /// Show the status reported by a running daemon
    Status,
}

fn init_logging(
    verbose: bool,
    config: &DeployConfig,
) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.logging.format.eq_ignore_ascii_case("json") {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    }
}

fn pipeline(config: DeployConfig, docker: PathBuf) -> anyhow::Result<Pipeline> {
    let probe_timeout = config
        .services
        .iter()
        .filter_map(|s| s.health_check.as_ref().map(|h| h.timeout()))
        .max()
        .unwrap_or(Duration::from_secs(10));

    let runtime = Arc::new(DockerRuntime::new(DockerRuntimeConfig {
        docker_path: docker,
        ..DockerRuntimeConfig::default()
    }));
    let probe = Arc::new(HealthChecker::new(probe_timeout)?);
    Ok(Pipeline::new(config, runtime, probe))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, _root) = DeployConfig::load(cli.config.as_deref(), cli.project_dir.as_deref())?;
    if let Err(e) = init_logging(cli.verbose, &config) {
        eprintln!("Failed to set subscriber: {}", e);
    }

    let code = match cli.command {
        Commands::Up { profile, json } => {
            let pipeline = pipeline(config, cli.docker)?;
            commands::up(&pipeline, profile.resolve(), json).await?
        }
        Commands::Check { profile } => {
            let pipeline = pipeline(config, cli.docker)?;
            commands::check(&pipeline, profile.resolve()).await?
        }
        Commands::Down { profile } => {
            let pipeline = pipeline(config, cli.docker)?;
            commands::down(&pipeline, Profile::select(&profile)).await?
        }
        Commands::Config { profile } => {
            let pipeline = pipeline(config, cli.docker)?;
            commands::config(&pipeline, profile.resolve())?
        }
        Commands::Gpus => {
            commands::gpus().await?;
            0
        }
        Commands::Status => {
            let client = commands::ApiClient::new(&cli.api);
            commands::status(&client).await?
        }
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile_of(args: &[&str]) -> Profile {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Up { profile, .. } => profile.resolve(),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_profile_from_mode() {
        assert_eq!(profile_of(&["ttsdeploy", "up"]), Profile::Basic);
        assert_eq!(profile_of(&["ttsdeploy", "up", "--profile", "full"]), Profile::Full);
        assert_eq!(
            profile_of(&["ttsdeploy", "up", "--profile", "with-monitoring"]),
            Profile::WithMonitoring
        );
        assert_eq!(profile_of(&["ttsdeploy", "up", "--profile", "turbo"]), Profile::Basic);
    }

    #[test]
    fn test_profile_from_flags() {
        assert_eq!(profile_of(&["ttsdeploy", "up", "--with-proxy"]), Profile::WithProxy);
        assert_eq!(
            profile_of(&["ttsdeploy", "up", "--with-proxy", "--with-monitoring"]),
            Profile::Full
        );
        assert_eq!(
            profile_of(&["ttsdeploy", "up", "--with-proxy", "--profile", "basic"]),
            Profile::Basic
        );
    }

    #[test]
    fn test_second_logging_init_is_reported() {
        let config = DeployConfig::default();
        let _ = init_logging(false, &config);
        assert!(init_logging(true, &config).is_err());
    }

    #[test]
    fn test_down_defaults_to_full() {
        let cli = Cli::try_parse_from(["ttsdeploy", "down"]).unwrap();
        assert!(matches!(cli.command, Commands::Down { ref profile } if profile == "full"));
    }
}
