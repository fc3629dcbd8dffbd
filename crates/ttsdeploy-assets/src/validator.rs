//! Pre-flight checks for host-side assets

use std::path::PathBuf;
use tracing::{debug, info, warn};
use ttsdeploy_core::{AssetKind, MissingAsset, MissingReason, RequiredAsset};

/// Outcome of validating a set of assets
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Required assets that failed validation
    pub missing: Vec<MissingAsset>,
    /// Optional assets that are absent
    pub skipped: Vec<MissingAsset>,
    /// Writable directories created during validation
    pub created: Vec<PathBuf>,
}

impl ValidationReport {
    /// No required asset is missing
    pub fn passed(&self) -> bool {
        self.missing.is_empty()
    }

    /// Names of the missing required assets
    pub fn missing_names(&self) -> Vec<&str> {
        self.missing.iter().map(|m| m.name.as_str()).collect()
    }
}

/// Validates host paths before a build is attempted
pub struct AssetValidator {
    assets: Vec<RequiredAsset>,
}

impl AssetValidator {
    /// Create a validator over the given assets
    pub fn new(assets: Vec<RequiredAsset>) -> Self {
        Self { assets }
    }

    /// Check every asset
    ///
    /// Absent writable directories are created; everything else is only
    /// inspected.
    pub async fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        for asset in &self.assets {
            match self.check(asset).await {
                Ok(Some(created)) => report.created.push(created),
                Ok(None) => {}
                Err(reason) => {
                    let missing = MissingAsset {
                        name: asset.name.clone(),
                        path: asset.path.clone(),
                        reason,
                    };
                    if asset.optional {
                        warn!(asset = %missing, "Optional asset unavailable");
                        report.skipped.push(missing);
                    } else {
                        warn!(asset = %missing, "Required asset missing");
                        report.missing.push(missing);
                    }
                }
            }
        }

        info!(
            checked = self.assets.len(),
            missing = report.missing.len(),
            created = report.created.len(),
            "Asset validation finished"
        );

        report
    }

    /// Check one asset, returning the path if it had to be created
    async fn check(&self, asset: &RequiredAsset) -> Result<Option<PathBuf>, MissingReason> {
        let metadata = match tokio::fs::metadata(&asset.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if asset.is_writable_dir() {
                    tokio::fs::create_dir_all(&asset.path)
                        .await
                        .map_err(|e| MissingReason::CreateFailed(e.to_string()))?;
                    info!(path = %asset.path.display(), "Created working directory");
                    return Ok(Some(asset.path.clone()));
                }
                return Err(MissingReason::Absent);
            }
            Err(_) => return Err(MissingReason::Absent),
        };

        match asset.kind {
            AssetKind::File if !metadata.is_file() => Err(MissingReason::WrongKind),
            AssetKind::File if metadata.len() == 0 => Err(MissingReason::Empty),
            AssetKind::Directory if !metadata.is_dir() => Err(MissingReason::WrongKind),
            _ => {
                debug!(asset = %asset.name, "Asset present");
                Ok(None)
            }
        }
    }
}
