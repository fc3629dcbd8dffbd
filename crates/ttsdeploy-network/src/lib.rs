//! ttsdeploy-network: HTTP health probing
//!
//! This crate provides the liveness probe used after services start:
//! - The `HealthProbe` trait
//! - A reqwest-backed `HealthChecker`

pub mod health;

pub use health::{HealthChecker, HealthProbe};
