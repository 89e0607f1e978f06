//! Error kinds crossing component boundaries.
//!
//! Exactly six kinds exist; every component maps its internal failures to one
//! of them and the HTTP layer translates kinds to status codes.

use std::error::Error;

use thiserror::Error;

/// Convenience alias for fallible drive operations.
pub type DriveResult<T> = Result<T, DriveError>;

/// Boundary error for all data-plane components.
#[derive(Debug, Error)]
pub enum DriveError {
    /// The addressed entity is absent or soft-deleted from the caller's view.
    #[error("{entity} not found")]
    NotFound {
        /// Entity label, e.g. `item` or `upload session`.
        entity: &'static str,
    },
    /// The caller supplied an invalid argument.
    #[error("invalid input: {message}")]
    BadInput {
        /// Human-readable description of the rejected input.
        message: String,
    },
    /// A uniqueness collision that the caller cannot resolve by retrying.
    #[error("conflict: {message}")]
    Conflict {
        /// Human-readable description of the collision.
        message: String,
    },
    /// The operation is not permitted in the current state.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Human-readable description of the refusal.
        message: String,
    },
    /// Upstream I/O failed in a way that is safe to retry.
    #[error("transient failure during {operation}")]
    Transient {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Upstream I/O failed unrecoverably.
    #[error("permanent failure during {operation}")]
    Permanent {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl DriveError {
    /// Shorthand for a [`DriveError::NotFound`].
    #[must_use]
    pub const fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    /// Shorthand for a [`DriveError::BadInput`].
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput {
            message: message.into(),
        }
    }

    /// Shorthand for a [`DriveError::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Shorthand for a [`DriveError::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Wrap a retryable upstream failure.
    pub fn transient(
        operation: &'static str,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transient {
            operation,
            source: Box::new(source),
        }
    }

    /// Wrap an unrecoverable upstream failure.
    pub fn permanent(
        operation: &'static str,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::Permanent {
            operation,
            source: Box::new(source),
        }
    }

    /// Whether the error is safe to retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::BadInput { .. } => "bad_input",
            Self::Conflict { .. } => "conflict",
            Self::Forbidden { .. } => "forbidden",
            Self::Transient { .. } => "transient",
            Self::Permanent { .. } => "permanent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(DriveError::not_found("item").kind(), "not_found");
        assert_eq!(DriveError::bad_input("empty name").kind(), "bad_input");
        assert_eq!(DriveError::conflict("name taken").kind(), "conflict");
        assert_eq!(DriveError::forbidden("vault locked").kind(), "forbidden");
        let io_err = || io::Error::new(io::ErrorKind::TimedOut, "timeout");
        assert_eq!(DriveError::transient("fetch", io_err()).kind(), "transient");
        assert_eq!(DriveError::permanent("fetch", io_err()).kind(), "permanent");
    }

    #[test]
    fn only_transient_is_retryable() {
        let io_err = || io::Error::other("boom");
        assert!(DriveError::transient("send", io_err()).is_transient());
        assert!(!DriveError::permanent("send", io_err()).is_transient());
        assert!(!DriveError::not_found("item").is_transient());
    }

    #[test]
    fn sources_are_preserved() {
        use std::error::Error as _;
        let err = DriveError::transient("fetch", io::Error::other("boom"));
        assert!(err.source().is_some());
        assert!(DriveError::not_found("chunk").source().is_none());
    }
}
