use anyhow::{anyhow, Context, Result};
use reload_core::{PackageState, Task, ValidationStatus};
use reload_security::verify_sha256_file;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::fs_utils::remove_dir_if_exists;
use crate::records::{read_package_record, update_record_state, LocalPackageRecord};
use crate::ReloadLayout;

const BUNDLE_INFO_FILE: &str = "bundle.info";

/// Deploys a downloaded archive into `bundles/<id>`.
#[derive(Debug)]
pub struct InstallTask {
    layout: ReloadLayout,
    package_id: String,
    deployed: bool,
    displaced_previous: bool,
    prior_state: Option<PackageState>,
}

impl InstallTask {
    pub fn new(layout: ReloadLayout, package_id: impl Into<String>) -> Self {
        Self {
            layout,
            package_id: package_id.into(),
            deployed: false,
            displaced_previous: false,
            prior_state: None,
        }
    }

    fn stage_bundle(&self, record: &LocalPackageRecord, archive: &Path) -> Result<PathBuf> {
        let staging = self.layout.install_staging_path(&self.package_id);
        remove_dir_if_exists(&staging)
            .with_context(|| format!("failed to clear staging dir: {}", staging.display()))?;
        fs::create_dir_all(&staging)
            .with_context(|| format!("failed to create staging dir: {}", staging.display()))?;

        let file_name = archive
            .file_name()
            .map(|name| name.to_os_string())
            .ok_or_else(|| anyhow!("archive path has no file name: {}", archive.display()))?;
        fs::copy(archive, staging.join(&file_name)).with_context(|| {
            format!(
                "failed to stage archive {} into {}",
                archive.display(),
                staging.display()
            )
        })?;
        fs::write(
            staging.join(BUNDLE_INFO_FILE),
            format!(
                "id={}\nname={}\nversion={}\n",
                record.id, record.name, record.version
            ),
        )
        .with_context(|| format!("failed to write bundle info in {}", staging.display()))?;

        Ok(staging)
    }
}

impl Task for InstallTask {
    fn package_id(&self) -> &str {
        &self.package_id
    }

    fn validate(&mut self) -> Result<ValidationStatus> {
        let mut status = ValidationStatus::new();
        let Some(record) = read_package_record(&self.layout, &self.package_id)? else {
            status.add_error(format!("package '{}' is not registered locally", self.package_id));
            return Ok(status);
        };

        if record.state != PackageState::Downloaded {
            status.add_error(format!(
                "package '{}' must be downloaded before install (state={})",
                record.id, record.state
            ));
        }

        match record.archive_path.as_deref().map(PathBuf::from) {
            None => status.add_error(format!("package '{}' has no downloaded archive", record.id)),
            Some(archive) if !archive.is_file() => status.add_error(format!(
                "downloaded archive is missing: {}",
                archive.display()
            )),
            Some(archive) => {
                if let Some(expected) = &record.sha256 {
                    if !verify_sha256_file(&archive, expected)? {
                        status.add_error(format!(
                            "downloaded archive checksum mismatch: {}",
                            archive.display()
                        ));
                    }
                }
            }
        }

        let bundle_dir = self.layout.bundle_dir(&self.package_id);
        if bundle_dir.exists() {
            status.add_warning(format!(
                "stale deployment will be replaced: {}",
                bundle_dir.display()
            ));
        }

        Ok(status)
    }

    fn run(&mut self) -> Result<()> {
        let record = read_package_record(&self.layout, &self.package_id)?
            .ok_or_else(|| anyhow!("package '{}' is not registered locally", self.package_id))?;
        let archive = record
            .archive_path
            .as_deref()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("package '{}' has no downloaded archive", record.id))?;

        self.prior_state = Some(record.state);
        update_record_state(&self.layout, &self.package_id, PackageState::Installing)?;
        let staging = self.stage_bundle(&record, &archive)?;

        let bundle_dir = self.layout.bundle_dir(&self.package_id);
        if bundle_dir.exists() {
            let backup = self.layout.backup_path(&self.package_id);
            remove_dir_if_exists(&backup)
                .with_context(|| format!("failed to clear backup: {}", backup.display()))?;
            fs::create_dir_all(self.layout.backups_dir())?;
            fs::rename(&bundle_dir, &backup).with_context(|| {
                format!("failed to move stale deployment {}", bundle_dir.display())
            })?;
            self.displaced_previous = true;
        }

        fs::create_dir_all(self.layout.bundles_dir())?;
        fs::rename(&staging, &bundle_dir).with_context(|| {
            format!(
                "failed to deploy {} into {}",
                staging.display(),
                bundle_dir.display()
            )
        })?;
        self.deployed = true;

        update_record_state(&self.layout, &self.package_id, PackageState::Installed)?;
        if self.displaced_previous {
            let backup = self.layout.backup_path(&self.package_id);
            if let Err(err) = remove_dir_if_exists(&backup) {
                warn!(path = %backup.display(), error = %err, "failed to drop replaced deployment");
            }
        }
        info!(package = %self.package_id, path = %bundle_dir.display(), "package deployed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        debug!(package = %self.package_id, "rolling back install");
        let bundle_dir = self.layout.bundle_dir(&self.package_id);
        if self.deployed {
            remove_dir_if_exists(&bundle_dir)
                .with_context(|| format!("failed to remove deployment: {}", bundle_dir.display()))?;
            self.deployed = false;
        }
        let staging = self.layout.install_staging_path(&self.package_id);
        remove_dir_if_exists(&staging)
            .with_context(|| format!("failed to remove staging dir: {}", staging.display()))?;

        if self.displaced_previous {
            let backup = self.layout.backup_path(&self.package_id);
            if backup.exists() {
                fs::rename(&backup, &bundle_dir).with_context(|| {
                    format!("failed to restore deployment from {}", backup.display())
                })?;
            }
            self.displaced_previous = false;
        }

        // Only a state that run() changed is restored.
        if let Some(prior_state) = self.prior_state.take() {
            if read_package_record(&self.layout, &self.package_id)?.is_some() {
                update_record_state(&self.layout, &self.package_id, prior_state)?;
            }
        }
        Ok(())
    }
}

/// Removes the deployment of an installed package, keeping its downloaded archive.
#[derive(Debug)]
pub struct UninstallTask {
    layout: ReloadLayout,
    package_id: String,
    moved_to_backup: bool,
    prior_state: Option<PackageState>,
}

impl UninstallTask {
    pub fn new(layout: ReloadLayout, package_id: impl Into<String>) -> Self {
        Self {
            layout,
            package_id: package_id.into(),
            moved_to_backup: false,
            prior_state: None,
        }
    }
}

impl Task for UninstallTask {
    fn package_id(&self) -> &str {
        &self.package_id
    }

    fn validate(&mut self) -> Result<ValidationStatus> {
        let mut status = ValidationStatus::new();
        let Some(record) = read_package_record(&self.layout, &self.package_id)? else {
            status.add_error(format!("package '{}' is not registered locally", self.package_id));
            return Ok(status);
        };

        if !record.state.is_installed() {
            status.add_error(format!(
                "package '{}' is not installed (state={})",
                record.id, record.state
            ));
        }

        let bundle_dir = self.layout.bundle_dir(&self.package_id);
        if !bundle_dir.exists() {
            status.add_warning(format!(
                "deployment already missing: {}",
                bundle_dir.display()
            ));
        }

        Ok(status)
    }

    fn run(&mut self) -> Result<()> {
        let record = read_package_record(&self.layout, &self.package_id)?
            .ok_or_else(|| anyhow!("package '{}' is not registered locally", self.package_id))?;
        self.prior_state = Some(record.state);

        let bundle_dir = self.layout.bundle_dir(&self.package_id);
        let backup = self.layout.backup_path(&self.package_id);
        if bundle_dir.exists() {
            remove_dir_if_exists(&backup)
                .with_context(|| format!("failed to clear backup: {}", backup.display()))?;
            fs::create_dir_all(self.layout.backups_dir())?;
            fs::rename(&bundle_dir, &backup).with_context(|| {
                format!(
                    "failed to move deployment {} to {}",
                    bundle_dir.display(),
                    backup.display()
                )
            })?;
            self.moved_to_backup = true;
        }

        update_record_state(&self.layout, &self.package_id, PackageState::Downloaded)?;

        if self.moved_to_backup {
            if let Err(err) = remove_dir_if_exists(&backup) {
                warn!(path = %backup.display(), error = %err, "failed to drop uninstall backup");
            }
            self.moved_to_backup = false;
        }
        info!(package = %self.package_id, "package undeployed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        debug!(package = %self.package_id, "rolling back uninstall");
        if self.moved_to_backup {
            let backup = self.layout.backup_path(&self.package_id);
            let bundle_dir = self.layout.bundle_dir(&self.package_id);
            if backup.exists() && !bundle_dir.exists() {
                fs::rename(&backup, &bundle_dir).with_context(|| {
                    format!("failed to restore deployment from {}", backup.display())
                })?;
            }
            self.moved_to_backup = false;
        }

        if let Some(state) = self.prior_state.take() {
            if read_package_record(&self.layout, &self.package_id)?.is_some() {
                update_record_state(&self.layout, &self.package_id, state)?;
            }
        }
        Ok(())
    }
}
