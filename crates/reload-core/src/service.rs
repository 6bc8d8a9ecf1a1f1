use std::fmt;

use anyhow::Result;

use crate::download::DownloadHandle;
use crate::local::LocalPackage;
use crate::package::RemotePackage;
use crate::validation::ValidationStatus;

/// A reversible unit of package work, driven validate -> run -> (rollback).
pub trait Task {
    fn package_id(&self) -> &str;

    fn validate(&mut self) -> Result<ValidationStatus>;

    fn run(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}

pub trait RemotePackageSource {
    fn list_remote_studio_packages(&self) -> Result<Vec<RemotePackage>>;

    fn find_remote_package(&self, id: &str) -> Result<Option<RemotePackage>>;

    fn flush_cache(&self) -> Result<()>;

    fn download(&self, id: &str) -> Result<DownloadHandle>;
}

pub trait LocalPackageRegistry {
    fn package(&self, id: &str) -> Result<Option<LocalPackage>>;

    fn remove_package(&self, id: &str) -> Result<()>;

    fn install_task(&self, package: &LocalPackage) -> Result<Box<dyn Task>>;

    fn uninstall_task(&self, package: &LocalPackage) -> Result<Box<dyn Task>>;
}

/// Defers installation of a package until the host restarts.
pub trait RestartQueue {
    fn add_package_for_installation(&self, id: &str) -> Result<()>;
}

/// Exclusive claim on an installation, shared by every process that uses it.
pub trait InstallationLock: fmt::Debug + Send + Sync {
    /// Returns `false` when someone else already holds the claim.
    fn try_lock(&self) -> Result<bool>;

    fn unlock(&self) -> Result<()>;
}
