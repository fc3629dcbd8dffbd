//! ttsdeploy-api: Read-only REST API over a running deployment
//!
//! This crate exposes the status board of a run while it progresses:
//! - Run summary and verdict
//! - Per-service status and phase timeline
//! - Host capability and GPU inventory

pub mod rest;

pub use rest::{create_router, AppState};
