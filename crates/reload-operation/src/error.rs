use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("must be an administrator to hot reload studio packages (user '{user}')")]
    Unauthorized { user: String },

    #[error("no studio snapshot package was found")]
    SnapshotNotFound,

    #[error("cannot perform validation: remote package '{package_id}' not found")]
    RemotePackageNotFound { package_id: String },

    #[error("package '{package_id}' is not validated for your current platform: {platform}")]
    Incompatible { package_id: String, platform: String },

    #[error("failed to validate package '{package_id}' -> {}", .errors.join("; "))]
    ValidationFailed {
        package_id: String,
        errors: Vec<String>,
    },

    #[error("remote package service error: {0:#}")]
    Remote(#[source] anyhow::Error),

    #[error("error while installing studio snapshot: {0:#}")]
    Package(#[source] anyhow::Error),

    #[error("error while downloading studio snapshot '{package_id}': local package is {state}")]
    DownloadIncomplete { package_id: String, state: String },

    #[error(
        "error while downloading studio snapshot '{package_id}': no completion after {timeout:?}"
    )]
    DownloadTimedOut {
        package_id: String,
        timeout: Duration,
    },

    #[error("error while downloading studio snapshot '{package_id}': download interrupted")]
    Interrupted { package_id: String },

    #[error("invalid operation parameter: {0}")]
    InvalidParameter(String),
}
