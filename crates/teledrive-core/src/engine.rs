//! Narrow client interface for the external torrent engine.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DriveResult;

/// Source describing how a torrent should be handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineSource {
    /// A remote torrent or magnet URL the engine resolves itself.
    Url {
        /// URL to fetch.
        url: String,
    },
    /// A `.torrent` file persisted on local disk.
    File {
        /// Path to the metainfo file.
        path: PathBuf,
    },
}

impl EngineSource {
    /// Convenience constructor for URL sources.
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    /// Convenience constructor for on-disk metainfo sources.
    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File { path: path.into() }
    }
}

/// One file inside a torrent as reported by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineFile {
    /// Zero-based index within the torrent.
    pub index: i32,
    /// Path relative to the torrent's save directory.
    pub rel_path: String,
    /// Total file size in bytes.
    pub size_bytes: i64,
    /// Bytes of this file already on disk.
    pub bytes_done: i64,
}

impl EngineFile {
    /// Whether the engine has fully materialized this file on disk.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.bytes_done >= self.size_bytes
    }
}

/// Snapshot of one torrent's engine-side state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Display name once metainfo is resolved.
    pub name: Option<String>,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    /// Bytes downloaded so far.
    pub downloaded_bytes: i64,
    /// Total payload size; zero until metainfo is resolved.
    pub total_bytes: i64,
    /// Per-file state; empty until metainfo is resolved.
    pub files: Vec<EngineFile>,
    /// Whether the torrent is flagged private.
    pub private: bool,
    /// Tracker hosts announced by the metainfo.
    pub trackers: Vec<String>,
    /// Local directory the engine writes payload files into.
    pub save_path: PathBuf,
}

impl EngineStatus {
    /// Whether metainfo has been resolved and the file list is authoritative.
    #[must_use]
    pub const fn metainfo_ready(&self) -> bool {
        !self.files.is_empty()
    }
}

/// Client interface to the external torrent engine.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Hand a torrent to the engine, returning its opaque handle.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DriveError::Transient`] when the engine is busy and
    /// [`crate::DriveError::Permanent`] when the source is rejected.
    async fn add_torrent(&self, source: &EngineSource) -> DriveResult<String>;

    /// Snapshot the current state of a previously added torrent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DriveError::NotFound`] when the handle is unknown.
    async fn status(&self, handle: &str) -> DriveResult<EngineStatus>;

    /// Remove a torrent, optionally deleting its local payload files.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DriveError::Transient`] when the engine is busy.
    async fn remove(&self, handle: &str, delete_local_data: bool) -> DriveResult<()>;

    /// Pause a torrent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DriveError::NotFound`] when the handle is unknown.
    async fn pause(&self, handle: &str) -> DriveResult<()>;

    /// Resume a paused torrent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DriveError::NotFound`] when the handle is unknown.
    async fn resume(&self, handle: &str) -> DriveResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_completion_tracks_bytes_done() {
        let mut file = EngineFile {
            index: 0,
            rel_path: "season/episode.mkv".into(),
            size_bytes: 100,
            bytes_done: 40,
        };
        assert!(!file.is_complete());
        file.bytes_done = 100;
        assert!(file.is_complete());
    }

    #[test]
    fn metainfo_readiness_follows_file_list() {
        let mut status = EngineStatus {
            name: None,
            progress: 0.0,
            downloaded_bytes: 0,
            total_bytes: 0,
            files: Vec::new(),
            private: false,
            trackers: Vec::new(),
            save_path: PathBuf::from("/downloads"),
        };
        assert!(!status.metainfo_ready());
        status.files.push(EngineFile {
            index: 0,
            rel_path: "a.bin".into(),
            size_bytes: 1,
            bytes_done: 0,
        });
        assert!(status.metainfo_ready());
    }
}
