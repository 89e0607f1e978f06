//! Mapping from database failures onto the boundary error kinds.

use teledrive_core::DriveError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Map a sqlx failure onto the one boundary kind it corresponds to.
///
/// Unique violations become [`DriveError::Conflict`], foreign-key violations
/// become [`DriveError::BadInput`] (the referenced row is caller-supplied),
/// and everything else is a retryable I/O failure tagged with the operation.
pub(crate) fn map_sqlx(operation: &'static str, err: sqlx::Error) -> DriveError {
    if let Some(db) = err.as_database_error() {
        if let Some(code) = db.code() {
            if code == UNIQUE_VIOLATION {
                return DriveError::conflict(db.message().to_string());
            }
            if code == FOREIGN_KEY_VIOLATION {
                return DriveError::bad_input(db.message().to_string());
            }
        }
    }
    DriveError::transient(operation, err)
}

pub(crate) fn map_sqlx_err(
    operation: &'static str,
) -> impl FnOnce(sqlx::Error) -> DriveError {
    move |err| map_sqlx(operation, err)
}
