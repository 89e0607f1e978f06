//! Errors surfaced during application composition.

use teledrive_core::DriveError;
use thiserror::Error;

/// Result alias for bootstrap operations.
pub type AppResult<T> = Result<T, AppError>;

/// Failures raised while wiring the application together.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable was absent.
    #[error("missing required environment variable {name}")]
    MissingEnv {
        /// Variable name.
        name: &'static str,
    },
    /// An environment variable held an unparseable value.
    #[error("invalid value for environment variable {name}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// The data layer failed during startup.
    #[error("data layer startup failed during {operation}")]
    Data {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: DriveError,
    },
    /// Telemetry installation failed.
    #[error("telemetry startup failed during {operation}")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// Wrap a data-layer startup failure.
    #[must_use]
    pub const fn data(operation: &'static str, source: DriveError) -> Self {
        Self::Data { operation, source }
    }

    /// Wrap a telemetry startup failure.
    #[must_use]
    pub const fn telemetry(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Telemetry { operation, source }
    }
}
