use anyhow::{anyhow, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    Downloading,
    Downloaded,
    Installing,
    Installed,
    Started,
}

impl PackageState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Started => "started",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "downloading" => Ok(Self::Downloading),
            "downloaded" => Ok(Self::Downloaded),
            "installing" => Ok(Self::Installing),
            "installed" => Ok(Self::Installed),
            "started" => Ok(Self::Started),
            _ => Err(anyhow!("invalid package state: {value}")),
        }
    }

    pub fn is_installed(self) -> bool {
        matches!(self, Self::Installed | Self::Started)
    }
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package known to the local installation registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPackage {
    pub id: String,
    pub name: String,
    pub version: String,
    pub state: PackageState,
}

impl fmt::Display for LocalPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.id, self.version, self.state)
    }
}
