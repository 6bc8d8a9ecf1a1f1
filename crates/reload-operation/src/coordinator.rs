use std::time::Duration;

use reload_core::{
    is_compatible_with_target_platform, select_snapshot, DownloadHandle, DownloadWaitError,
    InstallationLock, LocalPackageRegistry, PackageState, RemotePackageSource, RestartQueue,
};
use tracing::{debug, info};

use crate::guard::{InstallationClaim, SingleFlight};
use crate::task_runner::perform_task;
use crate::{Principal, ReloadError, ReloadRequest};

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// What the running platform looks like to the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Platform filter such as `cap-10.10`; `None` accepts every package.
    pub target_platform: Option<String>,
    /// Live install/uninstall is only allowed in development mode.
    pub dev_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    Installed {
        package_id: String,
        replaced_version: Option<String>,
    },
    QueuedForRestart {
        package_id: String,
    },
    AlreadyInProgress,
}

#[derive(Debug)]
pub struct ReloadCoordinator<R, L, Q> {
    remote: R,
    local: L,
    restart_queue: Q,
    platform: PlatformInfo,
    download_timeout: Duration,
    in_progress: SingleFlight,
    installation_lock: Option<Box<dyn InstallationLock>>,
}

impl<R, L, Q> ReloadCoordinator<R, L, Q>
where
    R: RemotePackageSource,
    L: LocalPackageRegistry,
    Q: RestartQueue,
{
    pub fn new(remote: R, local: L, restart_queue: Q, platform: PlatformInfo) -> Self {
        Self {
            remote,
            local,
            restart_queue,
            platform,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            in_progress: SingleFlight::default(),
            installation_lock: None,
        }
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    /// Also turns away reloads while another process holds `lock`.
    pub fn with_installation_lock(mut self, lock: impl InstallationLock + 'static) -> Self {
        self.installation_lock = Some(Box::new(lock));
        self
    }

    pub fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    pub fn is_reload_in_progress(&self) -> bool {
        self.in_progress.is_busy()
    }

    /// Brings the current studio snapshot onto this system.
    ///
    /// Returns [`ReloadOutcome::AlreadyInProgress`] without touching anything
    /// when another reload holds the coordinator.
    pub fn reload(
        &self,
        principal: &Principal,
        request: &ReloadRequest,
    ) -> Result<ReloadOutcome, ReloadError> {
        if !principal.is_administrator() {
            return Err(ReloadError::Unauthorized {
                user: principal.name().to_string(),
            });
        }

        let Some(_guard) = self.in_progress.try_acquire() else {
            info!(user = %principal.name(), "studio snapshot reload already in progress; ignoring");
            return Ok(ReloadOutcome::AlreadyInProgress);
        };

        let _claim = match self.installation_lock.as_deref() {
            Some(lock) => {
                let claim = InstallationClaim::try_claim(lock).map_err(ReloadError::Package)?;
                if claim.is_none() {
                    info!(
                        user = %principal.name(),
                        "another process is reloading this installation; ignoring"
                    );
                    return Ok(ReloadOutcome::AlreadyInProgress);
                }
                claim
            }
            None => None,
        };

        let package_id = self.resolve_snapshot()?;
        info!(package = %package_id, validate = request.validate, "hot reloading studio snapshot");
        self.hot_reload_package(&package_id, request.validate)
    }

    fn resolve_snapshot(&self) -> Result<String, ReloadError> {
        let packages = self
            .remote
            .list_remote_studio_packages()
            .map_err(ReloadError::Remote)?;
        select_snapshot(&packages)
            .map(|package| package.id.clone())
            .ok_or(ReloadError::SnapshotNotFound)
    }

    fn hot_reload_package(
        &self,
        package_id: &str,
        validate: bool,
    ) -> Result<ReloadOutcome, ReloadError> {
        if validate {
            self.validate_remote_package(package_id)?;
        }

        if !self.platform.dev_mode {
            self.restart_queue
                .add_package_for_installation(package_id)
                .map_err(ReloadError::Package)?;
            return Ok(ReloadOutcome::QueuedForRestart {
                package_id: package_id.to_string(),
            });
        }

        self.install_live(package_id)
    }

    fn validate_remote_package(&self, package_id: &str) -> Result<(), ReloadError> {
        self.remote.flush_cache().map_err(ReloadError::Remote)?;
        let package = self
            .remote
            .find_remote_package(package_id)
            .map_err(ReloadError::Remote)?
            .ok_or_else(|| ReloadError::RemotePackageNotFound {
                package_id: package_id.to_string(),
            })?;

        let target_platform = self.platform.target_platform.as_deref();
        if !is_compatible_with_target_platform(&package, target_platform) {
            return Err(ReloadError::Incompatible {
                package_id: package_id.to_string(),
                platform: target_platform.unwrap_or_default().to_string(),
            });
        }
        debug!(package = %package_id, platform = ?target_platform, "remote package validated");
        Ok(())
    }

    fn install_live(&self, package_id: &str) -> Result<ReloadOutcome, ReloadError> {
        let existing = self
            .local
            .package(package_id)
            .map_err(ReloadError::Package)?;
        let replaced_version = existing.as_ref().map(|package| package.version.clone());

        if let Some(package) = existing {
            info!(package = %package, "removing package before update");
            // Same-version snapshots can only be reinstalled once the old copy is gone.
            if package.state.is_installed() {
                info!(package = %package_id, "uninstalling");
                let mut uninstall = self
                    .local
                    .uninstall_task(&package)
                    .map_err(ReloadError::Package)?;
                perform_task(uninstall.as_mut())?;
            }
            self.local
                .remove_package(package_id)
                .map_err(ReloadError::Package)?;
        }

        let download = self
            .remote
            .download(package_id)
            .map_err(ReloadError::Remote)?;
        self.wait_for_download(download)?;

        info!(package = %package_id, "installing");
        let package = match self
            .local
            .package(package_id)
            .map_err(ReloadError::Package)?
        {
            Some(package) if package.state == PackageState::Downloaded => package,
            other => {
                return Err(ReloadError::DownloadIncomplete {
                    package_id: package_id.to_string(),
                    state: other
                        .map(|package| package.state.to_string())
                        .unwrap_or_else(|| "absent".to_string()),
                });
            }
        };
        let mut install = self
            .local
            .install_task(&package)
            .map_err(ReloadError::Package)?;
        perform_task(install.as_mut())?;

        Ok(ReloadOutcome::Installed {
            package_id: package_id.to_string(),
            replaced_version,
        })
    }

    fn wait_for_download(&self, download: DownloadHandle) -> Result<(), ReloadError> {
        debug!(package = %download.package_id(), "waiting for studio snapshot download");
        download
            .wait(self.download_timeout)
            .map_err(|err| match err {
                DownloadWaitError::Interrupted { package_id } => {
                    ReloadError::Interrupted { package_id }
                }
                DownloadWaitError::TimedOut {
                    package_id,
                    timeout,
                } => ReloadError::DownloadTimedOut {
                    package_id,
                    timeout,
                },
                failed @ DownloadWaitError::Failed { .. } => ReloadError::Remote(failed.into()),
            })
    }
}
