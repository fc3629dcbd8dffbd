//! Error types for ttsdeploy

use crate::asset::MissingAsset;
use crate::profile::Profile;
use thiserror::Error;

/// Main error type for ttsdeploy
#[derive(Error, Debug)]
pub enum DeployError {
    /// One or more required host assets are absent
    #[error("Missing required assets: {}", join_missing(.0))]
    MissingAssets(Vec<MissingAsset>),

    /// The container build/run toolchain cannot be reached
    #[error("Container toolchain unavailable: {0}")]
    ToolchainUnavailable(String),

    /// A dependency edge escapes the active profile
    #[error(
        "Service '{service}' depends on '{dependency}', which is not part of profile '{profile}'"
    )]
    DependencyOutsideProfile {
        service: String,
        dependency: String,
        profile: Profile,
    },

    /// A dependency names a service that is not declared at all
    #[error("Service '{service}' depends on unknown service '{dependency}'")]
    UnknownDependency { service: String, dependency: String },

    /// The active services do not form a DAG
    #[error("Dependency cycle between services: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// Nothing untagged is active, so the inference service would not run
    #[error("Profile '{0}' has no core service; declare one without a profile tag")]
    NoCoreService(Profile),

    /// Two descriptors share a name
    #[error("Duplicate service name: {0}")]
    DuplicateService(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Image build failed
    #[error("Build of '{service}' failed: {message}")]
    Build { service: String, message: String },

    /// Container start failed
    #[error("Start of '{service}' failed: {message}")]
    Start { service: String, message: String },

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for ttsdeploy operations
pub type DeployResult<T> = Result<T, DeployError>;

impl DeployError {
    /// Errors that abort the run before anything is built or started
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            DeployError::MissingAssets(_) | DeployError::ToolchainUnavailable(_)
        )
    }

    /// Errors caused by a service graph that does not fit the profile
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DeployError::DependencyOutsideProfile { .. }
                | DeployError::UnknownDependency { .. }
                | DeployError::DependencyCycle(_)
                | DeployError::NoCoreService(_)
                | DeployError::DuplicateService(_)
                | DeployError::Config(_)
                | DeployError::Serialization(_)
        )
    }

    /// Operator-facing hint printed next to a fatal error
    pub fn remediation(&self) -> Option<String> {
        match self {
            DeployError::MissingAssets(missing) => {
                let paths: Vec<String> = missing
                    .iter()
                    .map(|m| format!("  - {}", m.path.display()))
                    .collect();
                Some(format!(
                    "Download the model files into place and re-run:\n{}",
                    paths.join("\n")
                ))
            }
            DeployError::ToolchainUnavailable(_) => Some(
                "Install Docker and make sure the daemon is running (`docker version` must succeed)"
                    .to_string(),
            ),
            DeployError::DependencyOutsideProfile {
                service, dependency, ..
            } => Some(format!(
                "Tag '{}' with the same profile as '{}', or drop the dependency",
                dependency, service
            )),
            DeployError::UnknownDependency { dependency, .. } => Some(format!(
                "Declare a service named '{}' or remove it from depends_on",
                dependency
            )),
            DeployError::DependencyCycle(_) => {
                Some("Break the cycle by removing one of the depends_on edges".to_string())
            }
            DeployError::NoCoreService(_) => Some(
                "Add the inference service to [[services]] without `profiles`, or drop the \
                 [[services]] tables to use the built-in stack"
                    .to_string(),
            ),
            _ => None,
        }
    }
}

fn join_missing(missing: &[MissingAsset]) -> String {
    missing
        .iter()
        .map(|m| m.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        DeployError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for DeployError {
    fn from(err: toml::de::Error) -> Self {
        DeployError::Config(err.to_string())
    }
}
