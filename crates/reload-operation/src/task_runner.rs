use reload_core::Task;
use tracing::{error, warn};

use crate::ReloadError;

/// Validates then runs `task`, rolling it back when either step fails.
///
/// Blocking validation errors abort; warnings are logged and ignored. A
/// failed rollback is logged and the original failure is returned.
pub(crate) fn perform_task(task: &mut dyn Task) -> Result<(), ReloadError> {
    let result = validate_and_run(task);
    if result.is_err() {
        if let Err(rollback_err) = task.rollback() {
            error!(
                package = %task.package_id(),
                error = %format!("{rollback_err:#}"),
                "rollback failed"
            );
        }
    }
    result
}

fn validate_and_run(task: &mut dyn Task) -> Result<(), ReloadError> {
    let status = task.validate().map_err(ReloadError::Package)?;
    if status.has_errors() {
        return Err(ReloadError::ValidationFailed {
            package_id: task.package_id().to_string(),
            errors: status.into_errors(),
        });
    }
    if status.has_warnings() {
        warn!(
            package = %task.package_id(),
            warnings = ?status.warnings(),
            "got warnings on package validation"
        );
    }
    task.run().map_err(ReloadError::Package)
}
