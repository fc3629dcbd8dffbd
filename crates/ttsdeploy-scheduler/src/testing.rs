//! Scriptable runtime and probe used by the scheduler tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use ttsdeploy_core::{DeployError, DeployResult, ServiceDescriptor};
use ttsdeploy_network::HealthProbe;
use ttsdeploy_runtime::{GpuRequest, Launch, Runtime};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Toolchain,
    GpuProbe,
    Network(String),
    Build(String),
    Start(String, GpuRequest),
    Stop(String),
}

/// Runtime that records every call and never touches a real daemon
pub struct FakeRuntime {
    toolchain: bool,
    gpu: bool,
    failing_builds: HashSet<String>,
    failing_starts: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<Call>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            toolchain: true,
            gpu: true,
            failing_builds: HashSet::new(),
            failing_starts: HashSet::new(),
            delays: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn without_gpu(mut self) -> Self {
        self.gpu = false;
        self
    }

    pub fn without_toolchain(mut self) -> Self {
        self.toolchain = false;
        self
    }

    pub fn failing_build(mut self, service: &str) -> Self {
        self.failing_builds.insert(service.to_string());
        self
    }

    pub fn failing_start(mut self, service: &str) -> Self {
        self.failing_starts.insert(service.to_string());
        self
    }

    /// Delay applied to both the build and the start of `service`
    pub fn with_delay(mut self, service: &str, delay: Duration) -> Self {
        self.delays.insert(service.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn started(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Start(name, _) => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    async fn delay(&self, service: &str) {
        if let Some(delay) = self.delays.get(service) {
            tokio::time::sleep(*delay).await;
        }
    }
}

#[async_trait]
impl Runtime for FakeRuntime {
    async fn check_toolchain(&self) -> DeployResult<String> {
        self.record(Call::Toolchain);
        if self.toolchain {
            Ok("fake".to_string())
        } else {
            Err(DeployError::ToolchainUnavailable("docker not found".to_string()))
        }
    }

    async fn gpu_support(&self) -> DeployResult<bool> {
        self.record(Call::GpuProbe);
        Ok(self.gpu)
    }

    async fn ensure_network(&self, network: &str) -> DeployResult<()> {
        self.record(Call::Network(network.to_string()));
        Ok(())
    }

    async fn build_image(&self, service: &ServiceDescriptor, _project: &str) -> DeployResult<()> {
        self.delay(&service.name).await;
        self.record(Call::Build(service.name.clone()));
        if self.failing_builds.contains(&service.name) {
            return Err(DeployError::Build {
                service: service.name.clone(),
                message: "exit status 1".to_string(),
            });
        }
        Ok(())
    }

    async fn start_service(
        &self,
        service: &ServiceDescriptor,
        launch: &Launch,
    ) -> DeployResult<String> {
        self.delay(&service.name).await;
        self.record(Call::Start(service.name.clone(), launch.gpu));
        if self.failing_starts.contains(&service.name) {
            return Err(DeployError::Start {
                service: service.name.clone(),
                message: "port is already allocated".to_string(),
            });
        }
        Ok(format!("{}-container", service.name))
    }

    async fn stop_service(&self, service: &ServiceDescriptor, _project: &str) -> DeployResult<()> {
        self.record(Call::Stop(service.name.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Healthy,
    /// Never answers
    Hang,
    Refuse,
    /// Fails the first `n` attempts
    HealthyAfter(u32),
}

/// Probe answering per URL from a script
pub struct FakeProbe {
    default: Behaviour,
    behaviours: HashMap<String, Behaviour>,
    attempts: Mutex<HashMap<String, u32>>,
}

impl FakeProbe {
    pub fn new(default: Behaviour) -> Self {
        Self {
            default,
            behaviours: HashMap::new(),
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with(mut self, url: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(url.to_string(), behaviour);
        self
    }

    pub fn attempts(&self, url: &str) -> u32 {
        self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn probe(&self, url: &str) -> DeployResult<()> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        match self.behaviours.get(url).copied().unwrap_or(self.default) {
            Behaviour::Healthy => Ok(()),
            Behaviour::Hang => std::future::pending().await,
            Behaviour::Refuse => Err(DeployError::Network(format!("{}: connection refused", url))),
            Behaviour::HealthyAfter(failures) if attempt > failures => Ok(()),
            Behaviour::HealthyAfter(_) => {
                Err(DeployError::Network(format!("{} answered 503 Service Unavailable", url)))
            }
        }
    }
}
