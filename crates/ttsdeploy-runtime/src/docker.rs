//! Docker CLI runtime implementation
//!
//! Every operation shells out to the `docker` binary, so anything that can
//! talk to the local daemon (including rootless setups) works unchanged.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::{debug, error, info};
use ttsdeploy_core::{DeployError, DeployResult, ServiceDescriptor};

use crate::traits::{GpuRequest, Launch, Runtime};

/// Label attached to every container started by ttsdeploy
pub const PROJECT_LABEL: &str = "io.ttsdeploy.project";

/// Docker runtime configuration
#[derive(Debug, Clone)]
pub struct DockerRuntimeConfig {
    /// Path to the docker binary
    pub docker_path: PathBuf,
    /// Restart policy applied to started containers
    pub restart_policy: String,
}

impl Default for DockerRuntimeConfig {
    fn default() -> Self {
        Self {
            docker_path: PathBuf::from("docker"),
            restart_policy: "unless-stopped".to_string(),
        }
    }
}

/// Runtime backed by the Docker CLI
pub struct DockerRuntime {
    config: DockerRuntimeConfig,
}

impl DockerRuntime {
    /// Create a new docker runtime
    pub fn new(config: DockerRuntimeConfig) -> Self {
        Self { config }
    }

    /// Arguments for `docker build`
    fn build_args(&self, service: &ServiceDescriptor, project: &str) -> Option<Vec<String>> {
        let build = service.build.as_ref()?;
        let mut args = vec![
            "build".to_string(),
            "-t".to_string(),
            service.image_ref(project),
            "-f".to_string(),
            build.context.join(&build.dockerfile).display().to_string(),
        ];
        for (key, value) in &build.args {
            args.push("--build-arg".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(build.context.display().to_string());
        Some(args)
    }

    /// Arguments for `docker run`
    fn run_args(&self, service: &ServiceDescriptor, launch: &Launch) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            service.container_name(&launch.project),
            "--label".to_string(),
            format!("{}={}", PROJECT_LABEL, launch.project),
            "--network".to_string(),
            launch.network.clone(),
            "--network-alias".to_string(),
            service.name.clone(),
            "--restart".to_string(),
            self.config.restart_policy.clone(),
        ];

        for port in &service.ports {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        for volume in &service.volumes {
            args.push("-v".to_string());
            args.push(volume.to_string());
        }
        for (key, value) in &service.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        if let Some(memory) = service.resources.memory_bytes {
            args.push("--memory".to_string());
            args.push(memory.to_string());
        }
        if let Some(shares) = service.resources.cpu_shares {
            args.push("--cpu-shares".to_string());
            args.push(shares.to_string());
        }
        if let GpuRequest::Devices(count) = launch.gpu {
            args.push("--gpus".to_string());
            args.push(format!("count={}", count));
        }

        args.push(service.image_ref(&launch.project));
        args.extend(service.command.iter().cloned());
        args
    }

    /// Run docker with the given arguments and capture its output
    async fn exec(&self, args: &[String]) -> DeployResult<Output> {
        debug!(args = ?args, "Running docker");
        Command::new(&self.config.docker_path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                DeployError::ToolchainUnavailable(format!(
                    "Failed to run {}: {}",
                    self.config.docker_path.display(),
                    e
                ))
            })
    }
}

fn stderr_of(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr
    }
}

#[async_trait]
impl Runtime for DockerRuntime {
    async fn check_toolchain(&self) -> DeployResult<String> {
        let args = ["version", "--format", "{{.Server.Version}}"].map(String::from);
        let output = self.exec(&args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(DeployError::ToolchainUnavailable(stderr_of(&output)))
        }
    }

    async fn gpu_support(&self) -> DeployResult<bool> {
        let args = ["info", "--format", "{{json .Runtimes}}"].map(String::from);
        let output = self.exec(&args).await?;
        if !output.status.success() {
            return Err(DeployError::Runtime(stderr_of(&output)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).contains("nvidia"))
    }

    async fn ensure_network(&self, network: &str) -> DeployResult<()> {
        let inspect = self
            .exec(&["network".to_string(), "inspect".to_string(), network.to_string()])
            .await?;
        if inspect.status.success() {
            return Ok(());
        }

        let create = self
            .exec(&["network".to_string(), "create".to_string(), network.to_string()])
            .await?;
        if create.status.success() {
            info!(network = network, "Created network");
            Ok(())
        } else {
            Err(DeployError::Runtime(format!(
                "Failed to create network {}: {}",
                network,
                stderr_of(&create)
            )))
        }
    }

    async fn build_image(&self, service: &ServiceDescriptor, project: &str) -> DeployResult<()> {
        let Some(args) = self.build_args(service, project) else {
            return Ok(());
        };

        info!(service = %service.name, image = %service.image_ref(project), "Building image");
        let output = self.exec(&args).await?;
        if output.status.success() {
            Ok(())
        } else {
            error!(service = %service.name, "Image build failed");
            Err(DeployError::Build {
                service: service.name.clone(),
                message: stderr_of(&output),
            })
        }
    }

    async fn start_service(
        &self,
        service: &ServiceDescriptor,
        launch: &Launch,
    ) -> DeployResult<String> {
        // A leftover container from an earlier run would block the name.
        match self
            .exec(&[
                "rm".to_string(),
                "-f".to_string(),
                service.container_name(&launch.project),
            ])
            .await
        {
            Ok(output) if !output.status.success() => debug!(
                service = %service.name,
                error = %stderr_of(&output),
                "No leftover container removed"
            ),
            Err(e) => debug!(
                service = %service.name,
                error = %e,
                "Leftover container cleanup failed"
            ),
            Ok(_) => {}
        }

        let output = self.exec(&self.run_args(service, launch)).await?;
        if output.status.success() {
            let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            info!(service = %service.name, container = %id, "Container started");
            Ok(id)
        } else {
            error!(service = %service.name, "Container start failed");
            Err(DeployError::Start {
                service: service.name.clone(),
                message: stderr_of(&output),
            })
        }
    }

    async fn stop_service(&self, service: &ServiceDescriptor, project: &str) -> DeployResult<()> {
        info!(service = %service.name, "Removing container");
        let output = self
            .exec(&[
                "rm".to_string(),
                "-f".to_string(),
                service.container_name(project),
            ])
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(DeployError::Runtime(stderr_of(&output)))
        }
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}
