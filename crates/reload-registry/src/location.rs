use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;

/// Where the remote catalog lives: a directory or an HTTP(S) base url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogLocation {
    Filesystem(PathBuf),
    Http(String),
}

impl CatalogLocation {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("catalog location must not be empty"));
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(Self::Http(trimmed.trim_end_matches('/').to_string()));
        }
        let path = trimmed.strip_prefix("file://").unwrap_or(trimmed);
        Ok(Self::Filesystem(PathBuf::from(path)))
    }

    /// Reads a file relative to the location; `Ok(None)` when it does not exist.
    pub fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Filesystem(root) => {
                let path = root.join(name);
                match fs::read(&path) {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                    Err(err) => Err(err)
                        .with_context(|| format!("failed to read catalog file: {}", path.display())),
                }
            }
            Self::Http(base) => {
                let url = format!("{base}/{name}");
                let response = reqwest::blocking::get(&url)
                    .with_context(|| format!("failed to reach catalog: {url}"))?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                let response = response
                    .error_for_status()
                    .with_context(|| format!("catalog request was rejected: {url}"))?;
                let bytes = response
                    .bytes()
                    .with_context(|| format!("failed to read catalog response: {url}"))?;
                Ok(Some(bytes.to_vec()))
            }
        }
    }

    /// Resolves a package url declared in the catalog against this location.
    pub fn resolve_url(&self, url: &str) -> String {
        if url.contains("://") || Path::new(url).is_absolute() {
            return url.to_string();
        }
        match self {
            Self::Filesystem(root) => root.join(url).display().to_string(),
            Self::Http(base) => format!("{base}/{}", url.trim_start_matches('/')),
        }
    }
}

impl fmt::Display for CatalogLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem(root) => write!(f, "{}", root.display()),
            Self::Http(base) => f.write_str(base),
        }
    }
}
