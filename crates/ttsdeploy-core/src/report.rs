//! End-of-run report and exit codes

use crate::gpu::Capability;
use crate::profile::Profile;
use crate::service::{ServicePhase, ServiceStatus};
use crate::DeployError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a run ended, mapped to a process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Every service is ready
    Ready,
    /// Missing asset or container toolchain, nothing was started
    PreflightFailed,
    /// Service graph does not fit the profile, nothing was started
    ConfigInvalid,
    /// Some services failed, stayed pending, or are unhealthy
    Degraded,
    /// Operator interrupted the run
    Interrupted,
}

impl Outcome {
    pub fn code(&self) -> i32 {
        match self {
            Outcome::Ready => 0,
            Outcome::PreflightFailed => 2,
            Outcome::ConfigInvalid => 3,
            Outcome::Degraded => 4,
            Outcome::Interrupted => 130,
        }
    }

    /// Classify a fatal error raised before any service started
    pub fn for_error(err: &DeployError) -> Self {
        if err.is_configuration() {
            Outcome::ConfigInvalid
        } else {
            Outcome::PreflightFailed
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Ready => write!(f, "ready"),
            Outcome::PreflightFailed => write!(f, "pre-flight failed"),
            Outcome::ConfigInvalid => write!(f, "configuration invalid"),
            Outcome::Degraded => write!(f, "degraded"),
            Outcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Aggregate result of one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub profile: Profile,
    pub capability: Capability,
    /// Every active service, in dependency order
    pub services: Vec<ServiceStatus>,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn outcome(&self) -> Outcome {
        if self.interrupted {
            Outcome::Interrupted
        } else if !self.services.is_empty() && self.services.iter().all(ServiceStatus::is_ready) {
            Outcome::Ready
        } else {
            Outcome::Degraded
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome().code()
    }

    pub fn service(&self, name: &str) -> Option<&ServiceStatus> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn count(&self, phase: ServicePhase) -> usize {
        self.services.iter().filter(|s| s.phase == phase).count()
    }
}
