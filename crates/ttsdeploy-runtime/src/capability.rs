//! GPU passthrough capability detection

use tracing::{info, warn};
use ttsdeploy_core::Capability;

use crate::traits::Runtime;

/// Probes the container runtime once per run for GPU passthrough
pub struct CapabilityDetector<'a> {
    runtime: &'a dyn Runtime,
}

impl<'a> CapabilityDetector<'a> {
    pub fn new(runtime: &'a dyn Runtime) -> Self {
        Self { runtime }
    }

    /// Detect GPU passthrough support
    ///
    /// Never fails: a probe error is treated as "no GPU" and the run
    /// continues in CPU-only mode.
    pub async fn detect(&self) -> Capability {
        match self.runtime.gpu_support().await {
            Ok(true) => {
                info!(runtime = self.runtime.name(), "GPU passthrough available");
                Capability::gpu()
            }
            Ok(false) => {
                warn!(
                    runtime = self.runtime.name(),
                    "No GPU runtime reported, services will run CPU-only"
                );
                Capability::cpu_only()
            }
            Err(e) => {
                warn!(
                    runtime = self.runtime.name(),
                    error = %e,
                    "GPU probe failed, services will run CPU-only"
                );
                Capability::cpu_only()
            }
        }
    }
}
