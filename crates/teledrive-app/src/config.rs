//! Environment-driven application configuration.
//!
//! Only the wiring knobs live here; every operational knob belongs to the
//! `runtime_settings` database singleton.

use std::path::PathBuf;

use teledrive_telemetry::LogFormat;

use crate::error::{AppError, AppResult};

const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_LOG_FORMAT: &str = "TELEDRIVE_LOG_FORMAT";
const ENV_BLOB_CHAT_ID: &str = "TELEDRIVE_BLOB_CHAT_ID";
const ENV_TORRENT_DIR: &str = "TELEDRIVE_TORRENT_DIR";

const DEFAULT_TORRENT_DIR: &str = "/var/lib/teledrive/torrents";

/// Static wiring configuration read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Default blob-tier chat receiving uploaded chunks.
    pub blob_chat_id: i64,
    /// Directory holding persisted `.torrent` files.
    pub torrent_dir: PathBuf,
}

impl AppConfig {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MissingEnv`] when `DATABASE_URL` or
    /// `TELEDRIVE_BLOB_CHAT_ID` is absent and [`AppError::InvalidEnv`] when
    /// the chat id is not an integer.
    pub fn from_env() -> AppResult<Self> {
        let database_url = std::env::var(ENV_DATABASE_URL).map_err(|_| AppError::MissingEnv {
            name: ENV_DATABASE_URL,
        })?;
        let log_format = LogFormat::from_env_value(std::env::var(ENV_LOG_FORMAT).ok().as_deref());
        let chat_value = std::env::var(ENV_BLOB_CHAT_ID).map_err(|_| AppError::MissingEnv {
            name: ENV_BLOB_CHAT_ID,
        })?;
        let blob_chat_id = chat_value.parse().map_err(|_| AppError::InvalidEnv {
            name: ENV_BLOB_CHAT_ID,
            value: chat_value,
        })?;
        let torrent_dir = std::env::var(ENV_TORRENT_DIR)
            .map_or_else(|_| PathBuf::from(DEFAULT_TORRENT_DIR), PathBuf::from);
        Ok(Self {
            database_url,
            log_format,
            blob_chat_id,
            torrent_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variables are process-global, so these tests only cover
    // the pure parsing edges via direct construction.
    #[test]
    fn invalid_chat_id_error_keeps_the_value() {
        let err = AppError::InvalidEnv {
            name: ENV_BLOB_CHAT_ID,
            value: "not-a-number".into(),
        };
        assert!(err.to_string().contains(ENV_BLOB_CHAT_ID));
    }
}
