use std::sync::Mutex;

use anyhow::{anyhow, Result};
use reload_core::{DownloadHandle, PackageKind, RemotePackage, RemotePackageSource};
use reload_installer::{spawn_download, ReloadLayout};
use tracing::{debug, info};

use crate::{load_catalog, CatalogLocation};

/// Remote package source backed by a catalog, with an in-memory listing cache.
#[derive(Debug)]
pub struct RemoteCatalog {
    location: CatalogLocation,
    layout: ReloadLayout,
    cache: Mutex<Option<Vec<RemotePackage>>>,
}

impl RemoteCatalog {
    pub fn new(location: CatalogLocation, layout: ReloadLayout) -> Self {
        Self {
            location,
            layout,
            cache: Mutex::new(None),
        }
    }

    pub fn location(&self) -> &CatalogLocation {
        &self.location
    }

    pub fn packages(&self) -> Result<Vec<RemotePackage>> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| anyhow!("catalog cache lock poisoned"))?;
        if let Some(packages) = cache.as_ref() {
            return Ok(packages.clone());
        }

        let packages = load_catalog(&self.location)?;
        debug!(location = %self.location, count = packages.len(), "catalog loaded");
        *cache = Some(packages.clone());
        Ok(packages)
    }
}

impl RemotePackageSource for RemoteCatalog {
    fn list_remote_studio_packages(&self) -> Result<Vec<RemotePackage>> {
        Ok(self
            .packages()?
            .into_iter()
            .filter(|package| package.kind == PackageKind::Studio)
            .collect())
    }

    fn find_remote_package(&self, id: &str) -> Result<Option<RemotePackage>> {
        Ok(self.packages()?.into_iter().find(|package| package.id == id))
    }

    fn flush_cache(&self) -> Result<()> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| anyhow!("catalog cache lock poisoned"))?;
        *cache = None;
        debug!(location = %self.location, "catalog cache flushed");
        Ok(())
    }

    fn download(&self, id: &str) -> Result<DownloadHandle> {
        let package = self
            .find_remote_package(id)?
            .ok_or_else(|| anyhow!("remote package '{id}' not found in {}", self.location))?;
        info!(package = %id, url = %package.url, "starting download");
        spawn_download(&self.layout, package)
    }
}
