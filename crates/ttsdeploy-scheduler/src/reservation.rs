//! GPU reservation decisions

use tracing::warn;
use ttsdeploy_core::{Capability, ServiceDescriptor};
use ttsdeploy_runtime::GpuRequest;

/// What a service is started with, given the host capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// Devices requested from the runtime
    pub gpu: GpuRequest,
    /// The service asked for a GPU the host cannot provide
    pub degraded: bool,
}

impl Reservation {
    /// Decide the reservation for `service`
    ///
    /// GPU requests pass through only when the host supports passthrough.
    /// Otherwise the service still starts, flagged as degraded; sharing and
    /// exclusivity of devices is left to the container runtime.
    pub fn for_service(service: &ServiceDescriptor, capability: Capability) -> Self {
        let requested = service.resources.gpu_count;
        match (requested, capability.gpu_available) {
            (0, _) => Self {
                gpu: GpuRequest::None,
                degraded: false,
            },
            (count, true) => Self {
                gpu: GpuRequest::Devices(count),
                degraded: false,
            },
            (count, false) => {
                warn!(
                    service = %service.name,
                    requested = count,
                    "GPU requested but unavailable, starting in CPU-only mode"
                );
                Self {
                    gpu: GpuRequest::None,
                    degraded: true,
                }
            }
        }
    }
}
