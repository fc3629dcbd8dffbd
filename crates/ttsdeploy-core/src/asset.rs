//! Host-side assets expected before a build is attempted

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Whether an asset is a regular file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    File,
    Directory,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::File => write!(f, "file"),
            AssetKind::Directory => write!(f, "directory"),
        }
    }
}

/// How a host path is mounted into a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MountMode {
    #[serde(rename = "ro")]
    ReadOnly,
    #[default]
    #[serde(rename = "rw")]
    ReadWrite,
}

impl MountMode {
    /// Suffix used in a `-v host:container:mode` binding
    pub fn as_flag(&self) -> &'static str {
        match self {
            MountMode::ReadOnly => "ro",
            MountMode::ReadWrite => "rw",
        }
    }
}

/// A path that must exist on the host before services are built
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequiredAsset {
    /// Short name reported when the asset is missing
    pub name: String,
    /// Host path, relative paths resolve against the project root
    pub path: PathBuf,
    /// Expected kind
    pub kind: AssetKind,
    /// Mount mode of the asset inside the services
    #[serde(default)]
    pub mode: MountMode,
    /// Absent optional assets only produce a warning
    #[serde(default)]
    pub optional: bool,
}

impl RequiredAsset {
    /// A read-only model file
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: AssetKind::File,
            mode: MountMode::ReadOnly,
            optional: false,
        }
    }

    /// A directory with the given mount mode
    pub fn directory(name: impl Into<String>, path: impl Into<PathBuf>, mode: MountMode) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: AssetKind::Directory,
            mode,
            optional: false,
        }
    }

    /// Mark the asset as optional
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Writable working directories are created when absent
    pub fn is_writable_dir(&self) -> bool {
        self.kind == AssetKind::Directory && self.mode == MountMode::ReadWrite
    }

    /// Resolve a relative path against `root`
    pub fn resolve(&mut self, root: &Path) {
        if self.path.is_relative() {
            self.path = root.join(&self.path);
        }
    }
}

/// Why an asset failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingReason {
    /// Nothing exists at the path
    Absent,
    /// Something exists but of the other kind
    WrongKind,
    /// The file exists but has zero length
    Empty,
    /// A writable directory could not be created
    CreateFailed(String),
}

impl std::fmt::Display for MissingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingReason::Absent => write!(f, "not found"),
            MissingReason::WrongKind => write!(f, "wrong kind"),
            MissingReason::Empty => write!(f, "empty file"),
            MissingReason::CreateFailed(e) => write!(f, "could not be created: {}", e),
        }
    }
}

/// A required asset that did not pass validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingAsset {
    pub name: String,
    pub path: PathBuf,
    pub reason: MissingReason,
}

impl std::fmt::Display for MissingAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.path.display(), self.reason)
    }
}
