use anyhow::{Context, Result};
use reload_core::{LocalPackage, LocalPackageRegistry, Task};
use tracing::debug;

use crate::fs_utils::remove_file_if_exists;
use crate::records::{read_package_record, read_package_records, remove_package_record};
use crate::tasks::{InstallTask, UninstallTask};
use crate::ReloadLayout;

/// Filesystem-backed local package registry rooted at a [`ReloadLayout`].
#[derive(Debug, Clone)]
pub struct LocalPackageService {
    layout: ReloadLayout,
}

impl LocalPackageService {
    pub fn new(layout: ReloadLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ReloadLayout {
        &self.layout
    }

    pub fn list_packages(&self) -> Result<Vec<LocalPackage>> {
        Ok(read_package_records(&self.layout)?
            .iter()
            .map(|record| record.to_local_package())
            .collect())
    }
}

impl LocalPackageRegistry for LocalPackageService {
    fn package(&self, id: &str) -> Result<Option<LocalPackage>> {
        Ok(read_package_record(&self.layout, id)?.map(|record| record.to_local_package()))
    }

    fn remove_package(&self, id: &str) -> Result<()> {
        let archive = self.layout.archive_path(id);
        remove_file_if_exists(&archive)
            .with_context(|| format!("failed to remove archive: {}", archive.display()))?;
        remove_package_record(&self.layout, id)?;
        debug!(package = %id, "removed local package");
        Ok(())
    }

    fn install_task(&self, package: &LocalPackage) -> Result<Box<dyn Task>> {
        Ok(Box::new(InstallTask::new(self.layout.clone(), &package.id)))
    }

    fn uninstall_task(&self, package: &LocalPackage) -> Result<Box<dyn Task>> {
        Ok(Box::new(UninstallTask::new(self.layout.clone(), &package.id)))
    }
}
