mod download;
mod fs_utils;
mod layout;
mod records;
mod reload_marker;
mod restart;
mod service;
mod tasks;

pub use download::spawn_download;
pub use fs_utils::current_unix_timestamp;
pub use layout::{default_user_root, ReloadLayout};
pub use records::{
    read_package_record, read_package_records, remove_package_record, update_record_state,
    write_package_record, LocalPackageRecord,
};
pub use reload_marker::ActiveReloadMarker;
pub use restart::InstallAfterRestart;
pub use service::LocalPackageService;
pub use tasks::{InstallTask, UninstallTask};
