//! ttsdeploy-runtime: Container runtime abstraction
//!
//! This crate provides the runtime the orchestrator drives:
//! - The `Runtime` trait (build, start, stop, probe)
//! - A Docker CLI implementation
//! - GPU passthrough capability detection

pub mod capability;
pub mod docker;
pub mod traits;

pub use capability::CapabilityDetector;
pub use docker::{DockerRuntime, DockerRuntimeConfig};
pub use traits::{GpuRequest, Launch, Runtime};
