use std::collections::HashSet;

use anyhow::{anyhow, Context, Result};
use reload_core::RemotePackage;
use reload_security::verify_ed25519_signature_hex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::CatalogLocation;

pub const CATALOG_FILE: &str = "catalog.toml";
pub const CATALOG_SIGNATURE_FILE: &str = "catalog.toml.sig";
pub const CATALOG_KEY_FILE: &str = "catalog.pub";

#[derive(Debug, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default = "catalog_file_version")]
    version: u32,
    #[serde(default)]
    packages: Vec<RemotePackage>,
}

fn catalog_file_version() -> u32 {
    1
}

pub fn parse_catalog(content: &str) -> Result<Vec<RemotePackage>> {
    let catalog: CatalogFile = toml::from_str(content).context("failed to parse catalog")?;
    if catalog.version != catalog_file_version() {
        return Err(anyhow!("unsupported catalog version: {}", catalog.version));
    }

    let mut seen = HashSet::new();
    for package in &catalog.packages {
        package
            .validate()
            .with_context(|| format!("invalid catalog entry '{}'", package.id))?;
        if !seen.insert(package.id.as_str()) {
            return Err(anyhow!("duplicate catalog entry '{}'", package.id));
        }
    }
    Ok(catalog.packages)
}

/// Fetches, verifies and parses the catalog at `location`.
///
/// When the location publishes a key, the catalog must carry a matching
/// detached signature.
pub fn load_catalog(location: &CatalogLocation) -> Result<Vec<RemotePackage>> {
    let payload = location
        .read(CATALOG_FILE)?
        .ok_or_else(|| anyhow!("no {CATALOG_FILE} found at {location}"))?;

    if let Some(key) = location.read(CATALOG_KEY_FILE)? {
        let signature = location.read(CATALOG_SIGNATURE_FILE)?.ok_or_else(|| {
            anyhow!("catalog at {location} is keyed but {CATALOG_SIGNATURE_FILE} is missing")
        })?;
        let key = String::from_utf8(key).context("catalog key is not valid UTF-8")?;
        let signature =
            String::from_utf8(signature).context("catalog signature is not valid UTF-8")?;
        if !verify_ed25519_signature_hex(&payload, &key, &signature)
            .with_context(|| format!("failed to verify catalog signature at {location}"))?
        {
            return Err(anyhow!("catalog signature verification failed at {location}"));
        }
        debug!(%location, "catalog signature verified");
    }

    let content = String::from_utf8(payload).context("catalog is not valid UTF-8")?;
    let mut packages = parse_catalog(&content)
        .with_context(|| format!("failed to load catalog from {location}"))?;
    for package in &mut packages {
        package.url = location.resolve_url(&package.url);
    }
    Ok(packages)
}
