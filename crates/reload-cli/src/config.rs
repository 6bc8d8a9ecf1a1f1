use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use reload_operation::{PlatformInfo, Principal, DEFAULT_DOWNLOAD_TIMEOUT};
use reload_registry::CatalogLocation;
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_ADMINISTRATOR: &str = "Administrator";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no catalog configured; set [catalog] location or pass --catalog")]
    MissingCatalog,

    #[error("[download] timeout_secs must be greater than zero")]
    InvalidTimeout,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReloadConfig {
    pub catalog: CatalogConfig,
    pub platform: PlatformConfig,
    pub download: DownloadConfig,
    pub access: AccessConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformConfig {
    pub target: Option<String>,
    pub dev_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessConfig {
    pub administrators: Vec<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            administrators: vec![DEFAULT_ADMINISTRATOR.to_string()],
        }
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub catalog: Option<String>,
    pub target_platform: Option<String>,
    pub dev_mode: bool,
}

impl ReloadConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Self::parse(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn apply(mut self, overrides: &Overrides) -> Self {
        if let Some(catalog) = &overrides.catalog {
            self.catalog.location = Some(catalog.clone());
        }
        if let Some(target) = &overrides.target_platform {
            self.platform.target = Some(target.clone());
        }
        if overrides.dev_mode {
            self.platform.dev_mode = true;
        }
        self
    }

    pub fn platform_info(&self) -> PlatformInfo {
        PlatformInfo {
            target_platform: self.platform.target.clone(),
            dev_mode: self.platform.dev_mode,
        }
    }

    pub fn download_timeout(&self) -> Result<Duration, ConfigError> {
        match self.download.timeout_secs {
            0 => Err(ConfigError::InvalidTimeout),
            secs => Ok(Duration::from_secs(secs)),
        }
    }

    pub fn catalog_location(&self) -> Result<CatalogLocation> {
        let location = self
            .catalog
            .location
            .as_deref()
            .ok_or(ConfigError::MissingCatalog)?;
        CatalogLocation::parse(location)
    }

    pub fn principal(&self, user: &str) -> Principal {
        let administrator = self
            .access
            .administrators
            .iter()
            .any(|admin| admin == user);
        Principal::new(user, administrator)
    }
}
