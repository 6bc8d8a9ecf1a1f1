use anyhow::{anyhow, Context};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::platform::TargetPlatformRange;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    Studio,
    Addon,
    Hotfix,
}

/// A package published by the remote catalog and available for download.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemotePackage {
    pub id: String,
    pub name: String,
    pub version: Version,
    pub kind: PackageKind,
    #[serde(default)]
    pub snapshot: bool,
    #[serde(default)]
    pub target_platforms: Vec<String>,
    pub target_platform_range: Option<TargetPlatformRange>,
    pub url: String,
    pub sha256: String,
    pub size: Option<u64>,
}

impl RemotePackage {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let package: Self = toml::from_str(input).context("failed to parse remote package")?;
        package.validate()?;
        Ok(package)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        validate_package_id(&self.id)?;
        if self.name.trim().is_empty() {
            return Err(anyhow!("package '{}' has an empty name", self.id));
        }
        if self.url.trim().is_empty() {
            return Err(anyhow!("package '{}' has an empty download url", self.id));
        }
        if self.sha256.len() != 64 || !self.sha256.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(anyhow!(
                "package '{}' has an invalid sha256 '{}'",
                self.id,
                self.sha256
            ));
        }
        Ok(())
    }

    /// Explicitly flagged packages count, as do versions such as `1.0.0-SNAPSHOT`.
    pub fn is_snapshot(&self) -> bool {
        self.snapshot
            || self
                .version
                .pre
                .as_str()
                .to_ascii_uppercase()
                .contains("SNAPSHOT")
    }
}

/// Picks the first snapshot in listing order.
pub fn select_snapshot(packages: &[RemotePackage]) -> Option<&RemotePackage> {
    packages.iter().find(|package| package.is_snapshot())
}

fn validate_package_id(id: &str) -> anyhow::Result<()> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("package id must not be empty"));
    }
    if trimmed != id {
        return Err(anyhow!("package id must not have surrounding whitespace: '{id}'"));
    }
    if id
        .chars()
        .any(|ch| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.'))
    {
        return Err(anyhow!("package id contains invalid character(s): {id}"));
    }
    if id.starts_with('.') {
        return Err(anyhow!("package id must not start with '.': {id}"));
    }
    Ok(())
}
