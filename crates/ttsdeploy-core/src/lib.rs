//! ttsdeploy-core: Core types for the ttsdeploy orchestrator
//!
//! This crate provides the fundamental types used throughout ttsdeploy:
//! - Required host assets and their validation results
//! - Deployment profiles and service descriptors
//! - Per-service runtime status and the end-of-run report
//! - Configuration types
//! - Error handling
//! - GPU capability and device inventory

pub mod asset;
pub mod config;
pub mod error;
pub mod gpu;
pub mod profile;
pub mod report;
pub mod service;

pub use asset::*;
pub use config::*;
pub use error::*;
pub use gpu::*;
pub use profile::*;
pub use report::*;
pub use service::*;
