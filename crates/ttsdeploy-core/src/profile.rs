//! Deployment profiles

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// Optional service group a descriptor can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTag {
    /// Reverse proxy in front of the UI and API
    Proxy,
    /// Metrics collection and dashboards
    Monitoring,
}

impl std::fmt::Display for ServiceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceTag::Proxy => write!(f, "proxy"),
            ServiceTag::Monitoring => write!(f, "monitoring"),
        }
    }
}

/// Which optional services a run includes
///
/// The inference service is part of every profile. `Full` is the union of
/// `WithProxy` and `WithMonitoring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    #[default]
    Basic,
    WithProxy,
    WithMonitoring,
    Full,
}

impl Profile {
    /// All profiles, smallest first
    pub const ALL: [Profile; 4] = [
        Profile::Basic,
        Profile::WithProxy,
        Profile::WithMonitoring,
        Profile::Full,
    ];

    /// Optional tags switched on by this profile
    pub fn tags(&self) -> &'static [ServiceTag] {
        match self {
            Profile::Basic => &[],
            Profile::WithProxy => &[ServiceTag::Proxy],
            Profile::WithMonitoring => &[ServiceTag::Monitoring],
            Profile::Full => &[ServiceTag::Proxy, ServiceTag::Monitoring],
        }
    }

    /// Whether services tagged `tag` are part of this profile
    pub fn includes(&self, tag: ServiceTag) -> bool {
        self.tags().contains(&tag)
    }

    /// Build a profile from individual feature flags
    pub fn from_flags(proxy: bool, monitoring: bool) -> Self {
        match (proxy, monitoring) {
            (false, false) => Profile::Basic,
            (true, false) => Profile::WithProxy,
            (false, true) => Profile::WithMonitoring,
            (true, true) => Profile::Full,
        }
    }

    /// Canonical launch-surface spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Basic => "basic",
            Profile::WithProxy => "with-proxy",
            Profile::WithMonitoring => "with-monitoring",
            Profile::Full => "full",
        }
    }

    /// Resolve a user selection, falling back to `Basic` with a warning
    ///
    /// Never fails: the minimal stack must always be startable.
    pub fn select(input: &str) -> Self {
        match input.parse() {
            Ok(profile) => profile,
            Err(e) => {
                warn!(input = %input, error = %e, "Falling back to basic profile");
                Profile::Basic
            }
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "basic" => Ok(Profile::Basic),
            "with-proxy" => Ok(Profile::WithProxy),
            "with-monitoring" => Ok(Profile::WithMonitoring),
            "full" => Ok(Profile::Full),
            other => Err(format!("unknown profile '{}'", other)),
        }
    }
}
