//! Version gating for patch sets.
//!
//! A patch set can declare a semver `version_range`; it only applies when
//! the front end's version satisfies it. The version comes from the
//! workspace's package.json.

use semver::{Version, VersionReq};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub enum VersionError {
    /// Invalid version string (e.g., "not-a-version")
    InvalidVersion { value: String, source: String },
    /// Invalid version requirement (e.g., ">=bad")
    InvalidRequirement { value: String, source: String },
    /// package.json missing or unreadable
    ManifestRead { path: PathBuf, source: String },
    /// package.json parsed but carries no usable "version" field
    MissingVersion { path: PathBuf },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version requirement '{}': {}", value, source)
            }
            VersionError::ManifestRead { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            VersionError::MissingVersion { path } => {
                write!(f, "no \"version\" field in {}", path.display())
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Check whether `version` satisfies `requirement`.
///
/// `None` or an empty/whitespace requirement means "apply to all versions".
pub fn matches_requirement(
    version: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(req_str) = requirement else {
        return Ok(true);
    };

    let req_str = req_str.trim();
    if req_str.is_empty() {
        return Ok(true);
    }

    let version = Version::parse(version).map_err(|e| VersionError::InvalidVersion {
        value: version.to_string(),
        source: e.to_string(),
    })?;

    let req = VersionReq::parse(req_str).map_err(|e| VersionError::InvalidRequirement {
        value: req_str.to_string(),
        source: e.to_string(),
    })?;

    Ok(req.matches(&version))
}

/// Read the front end's version from `<workspace_root>/package.json`.
pub fn read_package_version(workspace_root: &Path) -> Result<String, VersionError> {
    let path = workspace_root.join("package.json");

    let raw = fs::read_to_string(&path).map_err(|e| VersionError::ManifestRead {
        path: path.clone(),
        source: e.to_string(),
    })?;

    let manifest: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| VersionError::ManifestRead {
            path: path.clone(),
            source: e.to_string(),
        })?;

    manifest
        .get("version")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or(VersionError::MissingVersion { path })
}
