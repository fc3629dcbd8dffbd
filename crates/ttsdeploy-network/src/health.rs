//! Health checking for started services

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use ttsdeploy_core::{DeployError, DeployResult};

/// One liveness attempt against a URL
///
/// Callers bound each attempt with their own timeout; implementations may
/// also enforce one.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Succeeds when the endpoint answers with a success status
    async fn probe(&self, url: &str) -> DeployResult<()>;
}

/// Health checker issuing HTTP GET requests
pub struct HealthChecker {
    /// HTTP client for health checks
    client: reqwest::Client,
    /// Timeout duration
    timeout: Duration,
}

impl HealthChecker {
    /// Create a new health checker
    pub fn new(timeout: Duration) -> DeployResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeployError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Get the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl HealthProbe for HealthChecker {
    async fn probe(&self, url: &str) -> DeployResult<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DeployError::Network(format!("{}: {}", url, e)))?;

        let status = response.status();
        if status.is_success() {
            debug!(endpoint = %url, "Health check passed");
            Ok(())
        } else {
            Err(DeployError::Network(format!("{} answered {}", url, status)))
        }
    }
}
