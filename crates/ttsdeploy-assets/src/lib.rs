//! ttsdeploy-assets: Host asset validation
//!
//! This crate checks the host before any image is built:
//! - Model checkpoint files exist and are non-empty
//! - Read-only mount directories exist
//! - Writable working directories are created when absent

pub mod validator;

pub use validator::{AssetValidator, ValidationReport};
