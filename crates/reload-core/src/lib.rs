mod download;
mod local;
mod package;
mod platform;
mod service;
mod validation;

pub use download::{download_channel, DownloadCompleter, DownloadHandle, DownloadWaitError};
pub use local::{LocalPackage, PackageState};
pub use package::{select_snapshot, PackageKind, RemotePackage};
pub use platform::{is_compatible_with_target_platform, TargetPlatform, TargetPlatformRange};
pub use service::{
    InstallationLock, LocalPackageRegistry, RemotePackageSource, RestartQueue, Task,
};
pub use validation::ValidationStatus;
