//! Service descriptor and runtime status definitions

use crate::asset::MountMode;
use crate::profile::{Profile, ServiceTag};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Static configuration of one deployable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique service name
    pub name: String,
    /// Optional groups this service belongs to; empty means always active
    #[serde(default)]
    pub profiles: Vec<ServiceTag>,
    /// Build context, when the image is built locally
    #[serde(default)]
    pub build: Option<BuildSpec>,
    /// Pre-built image reference, or the tag for a locally built image
    #[serde(default)]
    pub image: Option<String>,
    /// Host to container port bindings
    #[serde(default)]
    pub ports: Vec<PortBinding>,
    /// Host to container volume bindings
    #[serde(default)]
    pub volumes: Vec<VolumeBinding>,
    /// Environment passed through to the service process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Services that must be starting before this one starts
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
    /// Resource reservations
    #[serde(default)]
    pub resources: ResourceLimits,
    /// Liveness probe
    #[serde(default)]
    pub health_check: Option<HealthCheckSpec>,
    /// Arguments appended after the image
    #[serde(default)]
    pub command: Vec<String>,
}

impl ServiceDescriptor {
    /// A service running a pre-built image
    pub fn from_image(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            profiles: Vec::new(),
            build: None,
            image: Some(image.into()),
            ports: Vec::new(),
            volumes: Vec::new(),
            env: BTreeMap::new(),
            depends_on: BTreeSet::new(),
            resources: ResourceLimits::default(),
            health_check: None,
            command: Vec::new(),
        }
    }

    /// A service built from a local context
    pub fn from_build(name: impl Into<String>, context: impl Into<PathBuf>) -> Self {
        let mut desc = Self::from_image(name, String::new());
        desc.image = None;
        desc.build = Some(BuildSpec::new(context));
        desc
    }

    pub fn with_tag(mut self, tag: ServiceTag) -> Self {
        self.profiles.push(tag);
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on.insert(name.into());
        self
    }

    pub fn with_port(mut self, host: u16, container: u16) -> Self {
        self.ports.push(PortBinding { host, container });
        self
    }

    pub fn with_health_check(mut self, check: HealthCheckSpec) -> Self {
        self.health_check = Some(check);
        self
    }

    pub fn with_gpus(mut self, count: u32) -> Self {
        self.resources.gpu_count = count;
        self
    }

    /// Whether the service is part of `profile`
    pub fn is_active_in(&self, profile: Profile) -> bool {
        self.is_core() || self.profiles.iter().any(|t| profile.includes(*t))
    }

    /// Untagged services run in every profile
    pub fn is_core(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Image reference used to run the service
    ///
    /// Locally built services without an explicit image are tagged
    /// `<project>-<name>:latest`.
    pub fn image_ref(&self, project: &str) -> String {
        match &self.image {
            Some(image) if !image.is_empty() => image.clone(),
            _ => format!("{}-{}:latest", project, self.name),
        }
    }

    /// Container name for this service within a project
    pub fn container_name(&self, project: &str) -> String {
        format!("{}-{}", project, self.name)
    }

    /// Resolve relative host paths against `root`
    pub fn resolve(&mut self, root: &Path) {
        if let Some(build) = &mut self.build {
            if build.context.is_relative() {
                build.context = root.join(&build.context);
            }
        }
        for volume in &mut self.volumes {
            if volume.host.is_relative() {
                volume.host = root.join(&volume.host);
            }
        }
    }
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

/// Local image build parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Build context directory
    pub context: PathBuf,
    /// Dockerfile path relative to the context
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    /// Build arguments
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl BuildSpec {
    pub fn new(context: impl Into<PathBuf>) -> Self {
        Self {
            context: context.into(),
            dockerfile: default_dockerfile(),
            args: BTreeMap::new(),
        }
    }
}

/// Host port published to a container port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

impl std::fmt::Display for PortBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

/// Host path mounted into a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeBinding {
    pub host: PathBuf,
    pub container: String,
    #[serde(default)]
    pub mode: MountMode,
}

impl VolumeBinding {
    pub fn new(host: impl Into<PathBuf>, container: impl Into<String>, mode: MountMode) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode,
        }
    }
}

impl std::fmt::Display for VolumeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.host.display(),
            self.container,
            self.mode.as_flag()
        )
    }
}

/// Resource reservations for a service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit in bytes; accepts `"16g"`-style strings
    #[serde(default, deserialize_with = "deserialize_memory")]
    pub memory_bytes: Option<u64>,
    /// Relative CPU weight
    #[serde(default)]
    pub cpu_shares: Option<u32>,
    /// Number of GPU devices requested
    #[serde(default)]
    pub gpu_count: u32,
}

/// Parse a memory size such as `512m`, `16g`, `16Gi` or a plain byte count
pub fn parse_memory(value: &str) -> Result<u64, String> {
    let trimmed = value.trim();
    let lower = trimmed.to_lowercase();
    let digits_end = lower
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(lower.len());
    let (number, unit) = lower.split_at(digits_end);
    let number: u64 = number
        .parse()
        .map_err(|_| format!("invalid memory size '{}'", trimmed))?;

    let multiplier: u64 = match unit.trim_end_matches('b').trim_end_matches('i') {
        "" => 1,
        "k" => 1024,
        "m" => 1024 * 1024,
        "g" => 1024 * 1024 * 1024,
        _ => return Err(format!("invalid memory unit in '{}'", trimmed)),
    };

    number
        .checked_mul(multiplier)
        .ok_or_else(|| format!("memory size '{}' overflows", trimmed))
}

fn deserialize_memory<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Memory {
        Bytes(u64),
        Text(String),
    }

    match Option::<Memory>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Memory::Bytes(b)) => Ok(Some(b)),
        Some(Memory::Text(s)) => parse_memory(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_start_period_secs() -> u64 {
    60
}

/// Liveness probe for a started service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    /// URL answered with a success status once ready
    pub url: String,
    /// Delay between attempts
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Bound on each attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts before the service is declared unhealthy
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Grace period after the service starts
    #[serde(default = "default_start_period_secs")]
    pub start_period_secs: u64,
}

impl HealthCheckSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            start_period_secs: default_start_period_secs(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn start_period(&self) -> Duration {
        Duration::from_secs(self.start_period_secs)
    }
}

/// Lifecycle phase of a service during one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServicePhase {
    /// Not processed yet
    Pending,
    /// Image build in progress
    Building,
    /// Container started, not yet verified
    Starting,
    /// Health check passed
    Healthy,
    /// Health check retries exhausted
    Unhealthy,
    /// Build or start failed, or a dependency failed
    Failed,
}

impl ServicePhase {
    /// Reached `Starting` or a later running phase
    pub fn has_started(&self) -> bool {
        matches!(
            self,
            ServicePhase::Starting | ServicePhase::Healthy | ServicePhase::Unhealthy
        )
    }
}

impl std::fmt::Display for ServicePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServicePhase::Pending => write!(f, "Pending"),
            ServicePhase::Building => write!(f, "Building"),
            ServicePhase::Starting => write!(f, "Starting"),
            ServicePhase::Healthy => write!(f, "Healthy"),
            ServicePhase::Unhealthy => write!(f, "Unhealthy"),
            ServicePhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Per-service record for one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    /// Service name
    pub name: String,
    /// Current phase
    pub phase: ServicePhase,
    /// Last error seen for this service
    pub last_error: Option<String>,
    /// Started without the GPU it requested
    pub degraded: bool,
    /// Whether the descriptor declares a health check
    pub health_checked: bool,
    /// Health attempts made so far
    pub health_attempts: u32,
    /// When the image build finished; the phase stays `Building` until the start
    #[serde(default)]
    pub built_at: Option<DateTime<Utc>>,
    /// Container identifier reported by the runtime
    pub container_id: Option<String>,
    /// Last transition timestamp
    pub updated_at: DateTime<Utc>,
}

impl ServiceStatus {
    /// Create a pending status for a descriptor
    pub fn pending(desc: &ServiceDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            phase: ServicePhase::Pending,
            last_error: None,
            degraded: false,
            health_checked: desc.health_check.is_some(),
            health_attempts: 0,
            built_at: None,
            container_id: None,
            updated_at: Utc::now(),
        }
    }

    /// Move to a new phase
    pub fn transition(&mut self, phase: ServicePhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    /// Mark the service failed with a reason
    pub fn fail(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.transition(ServicePhase::Failed);
    }

    /// Ready to serve: healthy, or running without a declared health check
    pub fn is_ready(&self) -> bool {
        match self.phase {
            ServicePhase::Healthy => true,
            ServicePhase::Starting => !self.health_checked,
            _ => false,
        }
    }
}

/// One recorded phase change, kept for the run timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub service: String,
    pub phase: ServicePhase,
    pub at: DateTime<Utc>,
}
