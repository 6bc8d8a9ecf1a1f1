//! Hot reload of the current studio snapshot package.
//!
//! [`ReloadCoordinator`] sequences calls into the remote package source, the
//! local package registry and the restart queue; it owns no package state of
//! its own beyond a single-flight guard.

mod coordinator;
mod error;
mod guard;
mod principal;
mod request;
mod task_runner;

pub use coordinator::{PlatformInfo, ReloadCoordinator, ReloadOutcome, DEFAULT_DOWNLOAD_TIMEOUT};
pub use error::ReloadError;
pub use principal::Principal;
pub use request::{ReloadRequest, OPERATION_ID, VALIDATE_PARAM};

#[cfg(test)]
mod tests;
