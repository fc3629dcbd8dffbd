//! ttsdeploy-scheduler: Service graph, orchestration and health monitoring
//!
//! This crate turns a validated configuration into a running stack:
//! - Profile filtering and DAG validation of the service graph
//! - GPU reservation decisions
//! - Dependency-ordered, concurrent build and start
//! - Bounded, retried health verification
//! - The end-to-end pipeline and explicit teardown

pub mod board;
pub mod cancel;
pub mod graph;
pub mod monitor;
pub mod orchestrator;
pub mod pipeline;
pub mod reservation;

#[cfg(test)]
mod testing;

pub use board::{DependencyState, StatusBoard};
pub use cancel::Cancellation;
pub use graph::{ResolvedGraph, ServiceGraph};
pub use monitor::HealthMonitor;
pub use orchestrator::Orchestrator;
pub use pipeline::{Pipeline, Preflight, PreparedRun, TeardownResult};
pub use reservation::Reservation;
