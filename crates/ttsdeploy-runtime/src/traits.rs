//! Runtime trait definitions

use async_trait::async_trait;
use ttsdeploy_core::{DeployResult, ServiceDescriptor};

/// GPU devices handed to a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuRequest {
    /// No device reservation
    None,
    /// Reserve this many devices through the runtime
    Devices(u32),
}

/// Per-start parameters that are not part of the static descriptor
#[derive(Debug, Clone)]
pub struct Launch {
    /// Project name used for container names and labels
    pub project: String,
    /// Network the container joins
    pub network: String,
    /// GPU reservation
    pub gpu: GpuRequest,
}

/// Runtime trait for building and running services
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Verify the build/run toolchain is usable, returning its version
    async fn check_toolchain(&self) -> DeployResult<String>;

    /// Whether the runtime reports GPU device support
    async fn gpu_support(&self) -> DeployResult<bool>;

    /// Create the shared network if it does not exist
    async fn ensure_network(&self, network: &str) -> DeployResult<()>;

    /// Build the image for a service with a build context
    async fn build_image(&self, service: &ServiceDescriptor, project: &str) -> DeployResult<()>;

    /// Start a service, returning the container id
    async fn start_service(&self, service: &ServiceDescriptor, launch: &Launch)
        -> DeployResult<String>;

    /// Stop and remove a service's container
    async fn stop_service(&self, service: &ServiceDescriptor, project: &str) -> DeployResult<()>;

    /// Get the runtime name
    fn name(&self) -> &'static str;
}
