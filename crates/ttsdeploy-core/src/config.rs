//! Configuration types for ttsdeploy

use crate::asset::{MountMode, RequiredAsset};
use crate::profile::ServiceTag;
use crate::service::{HealthCheckSpec, ServiceDescriptor, VolumeBinding};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default config file name looked up in the project directory
pub const CONFIG_FILE_NAME: &str = "ttsdeploy.toml";

/// Complete deployment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Project settings
    #[serde(default)]
    pub project: ProjectConfig,
    /// Status API settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Host paths checked before anything is built
    #[serde(default = "default_assets")]
    pub assets: Vec<RequiredAsset>,
    /// Every service the stack can run
    #[serde(default = "default_services")]
    pub services: Vec<ServiceDescriptor>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            project: ProjectConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            assets: default_assets(),
            services: default_services(),
        }
    }
}

impl DeployConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, crate::DeployError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::DeployError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, crate::DeployError> {
        toml::from_str(content)
            .map_err(|e| crate::DeployError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Make every relative host path absolute under `root`
    pub fn resolve_paths(&mut self, root: &Path) {
        for asset in &mut self.assets {
            asset.resolve(root);
        }
        for service in &mut self.services {
            service.resolve(root);
        }
    }

    /// Load the configuration of a project and resolve its host paths
    ///
    /// An explicit `path` must exist. Otherwise `ttsdeploy.toml` in the project
    /// directory is used when present, else the built-in stack. Returns the
    /// absolute project root alongside the configuration.
    pub fn load(
        path: Option<&Path>,
        project_dir: Option<&Path>,
    ) -> Result<(Self, PathBuf), crate::DeployError> {
        let root = match (project_dir, path.and_then(Path::parent)) {
            (Some(dir), _) => dir.to_path_buf(),
            (None, Some(parent)) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()?.join(root)
        };

        let mut config = match path {
            Some(file) => Self::from_file(file)?,
            None => {
                let candidate = root.join(CONFIG_FILE_NAME);
                if candidate.is_file() {
                    Self::from_file(&candidate)?
                } else {
                    Self::default()
                }
            }
        };
        config.resolve_paths(&root);

        Ok((config, root))
    }
}

/// Project settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Prefix for image tags, container names and the network
    pub name: String,
    /// Network joined by every container
    pub network: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "indextts".to_string(),
            network: None,
        }
    }
}

impl ProjectConfig {
    pub fn network_name(&self) -> String {
        self.network
            .clone()
            .unwrap_or_else(|| format!("{}-net", self.name))
    }
}

/// Status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the REST API server
    pub address: String,
    /// Port for the REST API server
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7880,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

fn default_assets() -> Vec<RequiredAsset> {
    let mut assets = vec![RequiredAsset::directory(
        "checkpoints",
        "checkpoints",
        MountMode::ReadOnly,
    )];
    for file in ["gpt.pth", "bpe.model", "bigvgan_generator.pth", "config.yaml"] {
        assets.push(RequiredAsset::file(file, format!("checkpoints/{}", file)));
    }
    for dir in ["outputs", "prompts", "logs"] {
        assets.push(RequiredAsset::directory(dir, dir, MountMode::ReadWrite));
    }
    assets.push(RequiredAsset::directory("demos", "demos", MountMode::ReadOnly).optional());
    assets
}

fn default_services() -> Vec<ServiceDescriptor> {
    let mut indextts = ServiceDescriptor::from_build("indextts", ".")
        .with_port(7860, 7860)
        .with_port(7871, 7871)
        .with_gpus(1)
        .with_health_check(HealthCheckSpec::new("http://127.0.0.1:7860/"));
    indextts.volumes = vec![
        VolumeBinding::new("checkpoints", "/app/checkpoints", MountMode::ReadOnly),
        VolumeBinding::new("outputs", "/app/outputs", MountMode::ReadWrite),
        VolumeBinding::new("prompts", "/app/prompts", MountMode::ReadWrite),
        VolumeBinding::new("demos", "/app/demos", MountMode::ReadOnly),
        VolumeBinding::new("logs", "/app/logs", MountMode::ReadWrite),
    ];
    indextts.env = BTreeMap::from([
        ("CUDA_VISIBLE_DEVICES".to_string(), "0".to_string()),
        ("NVIDIA_VISIBLE_DEVICES".to_string(), "all".to_string()),
        ("PYTHONUNBUFFERED".to_string(), "1".to_string()),
        ("TZ".to_string(), "UTC".to_string()),
    ]);
    indextts.resources.memory_bytes = Some(16 * 1024 * 1024 * 1024);

    let nginx = ServiceDescriptor::from_build("nginx", "docker/nginx")
        .with_tag(ServiceTag::Proxy)
        .with_port(80, 80)
        .with_port(443, 443)
        .with_dependency("indextts");

    let prometheus = ServiceDescriptor::from_image("prometheus", "prom/prometheus:latest")
        .with_tag(ServiceTag::Monitoring)
        .with_port(9090, 9090)
        .with_health_check(HealthCheckSpec {
            start_period_secs: 10,
            ..HealthCheckSpec::new("http://127.0.0.1:9090/-/healthy")
        });

    let grafana = ServiceDescriptor::from_image("grafana", "grafana/grafana:latest")
        .with_tag(ServiceTag::Monitoring)
        .with_port(3000, 3000)
        .with_dependency("prometheus")
        .with_health_check(HealthCheckSpec {
            start_period_secs: 15,
            ..HealthCheckSpec::new("http://127.0.0.1:3000/api/health")
        });

    vec![indextts, nginx, prometheus, grafana]
}
