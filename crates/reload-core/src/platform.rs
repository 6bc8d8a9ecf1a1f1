use anyhow::{anyhow, Context, Result};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::package::RemotePackage;

/// A platform identifier such as `cap-10.10`: a distribution name and its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPlatform {
    pub name: String,
    pub version: Version,
}

impl TargetPlatform {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let split_at = trimmed
            .char_indices()
            .find(|(index, ch)| {
                *ch == '-'
                    && trimmed[index + 1..]
                        .chars()
                        .next()
                        .is_some_and(|next| next.is_ascii_digit())
            })
            .map(|(index, _)| index)
            .ok_or_else(|| anyhow!("target platform must look like '<name>-<version>': {value}"))?;

        let name = &trimmed[..split_at];
        if name.is_empty() {
            return Err(anyhow!("target platform name must not be empty: {value}"));
        }
        let version = parse_lenient_version(&trimmed[split_at + 1..])
            .with_context(|| format!("invalid target platform version: {value}"))?;

        Ok(Self {
            name: name.to_string(),
            version,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetPlatformRange {
    pub name: String,
    pub requirement: VersionReq,
}

impl TargetPlatformRange {
    pub fn matches(&self, platform: &TargetPlatform) -> bool {
        self.name.eq_ignore_ascii_case(&platform.name) && self.requirement.matches(&platform.version)
    }
}

/// Checks a package against the running platform filter.
///
/// A missing filter, or a package that declares no target platforms at all,
/// is treated as compatible. Declared platforms match exactly (ignoring
/// case) or by prefix when they end with `*`, e.g. `cap-10.*`.
pub fn is_compatible_with_target_platform(
    package: &RemotePackage,
    platform_filter: Option<&str>,
) -> bool {
    let Some(filter) = platform_filter.map(str::trim).filter(|value| !value.is_empty()) else {
        return true;
    };
    if package.target_platforms.is_empty() && package.target_platform_range.is_none() {
        return true;
    }

    let filter_lower = filter.to_ascii_lowercase();
    let declared_match = package.target_platforms.iter().any(|declared| {
        let declared = declared.trim().to_ascii_lowercase();
        match declared.strip_suffix('*') {
            Some(prefix) => filter_lower.starts_with(prefix),
            None => declared == filter_lower,
        }
    });
    if declared_match {
        return true;
    }

    match (&package.target_platform_range, TargetPlatform::parse(filter)) {
        (Some(range), Ok(platform)) => range.matches(&platform),
        _ => false,
    }
}

fn parse_lenient_version(raw: &str) -> Result<Version> {
    let (core, pre) = match raw.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (raw, None),
    };

    let mut parts = core
        .split('.')
        .map(|part| {
            part.parse::<u64>()
                .with_context(|| format!("version component '{part}' is not numeric"))
        })
        .collect::<Result<Vec<_>>>()?;
    if parts.is_empty() || parts.len() > 3 {
        return Err(anyhow!("expected one to three version components: {raw}"));
    }
    parts.resize(3, 0);

    let mut normalized = format!("{}.{}.{}", parts[0], parts[1], parts[2]);
    if let Some(pre) = pre.filter(|pre| !pre.is_empty()) {
        normalized.push('-');
        normalized.push_str(pre);
    }
    Version::parse(&normalized).with_context(|| format!("invalid version: {raw}"))
}
