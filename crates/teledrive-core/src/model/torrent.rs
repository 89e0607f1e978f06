//! Torrent ingest tasks and their per-file children.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a torrent task was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentSourceKind {
    /// Submitted as a URL the engine resolves.
    Url,
    /// Submitted as an uploaded `.torrent` file.
    File,
}

impl TorrentSourceKind {
    /// Stable database label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::File => "file",
        }
    }

    /// Parse a database label; `None` for unknown labels.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "url" => Some(Self::Url),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// State machine position of a torrent ingest task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentTaskStatus {
    /// Waiting for the claimer.
    Queued,
    /// The engine is fetching payload data.
    Downloading,
    /// Parked until the user selects files.
    AwaitingSelection,
    /// Selected files are being uploaded to the blob tier.
    Uploading,
    /// All selected files uploaded.
    Completed,
    /// Terminal failure until an operator retry.
    Error,
}

impl TorrentTaskStatus {
    /// Stable database label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::AwaitingSelection => "awaiting_selection",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Parse a database label; `None` for unknown labels.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "queued" => Some(Self::Queued),
            "downloading" => Some(Self::Downloading),
            "awaiting_selection" => Some(Self::AwaitingSelection),
            "uploading" => Some(Self::Uploading),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether an operator retry is valid from this state.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Error | Self::Completed)
    }
}

/// One torrent ingest job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentTask {
    /// Opaque identity.
    pub id: Uuid,
    /// How the task was submitted.
    pub source_kind: TorrentSourceKind,
    /// Source URL for [`TorrentSourceKind::Url`] tasks.
    pub source_url: Option<String>,
    /// Display name.
    pub name: String,
    /// Lowercased hex info hash; empty until known for URL submissions.
    pub info_hash: String,
    /// Path of the persisted `.torrent` file; `None` for URL submissions.
    pub torrent_path: Option<String>,
    /// Engine handle; `None` until the task is enqueued with the engine.
    pub engine_handle: Option<String>,
    /// Blob-tier chat receiving the uploaded chunks.
    pub target_chat_id: i64,
    /// Destination folder for resulting items; `None` means the root.
    pub target_parent_id: Option<Uuid>,
    /// Identity of the submitter.
    pub submitted_by: String,
    /// Estimated payload size in bytes.
    pub total_size: i64,
    /// Bytes the engine has downloaded.
    pub downloaded_bytes: i64,
    /// Completion fraction in `[0, 1]`.
    pub progress: f64,
    /// Whether the torrent is flagged private.
    pub is_private: bool,
    /// Tracker hosts.
    pub trackers: Vec<String>,
    /// State machine position.
    pub status: TorrentTaskStatus,
    /// Failure detail for the `error` state.
    pub error: Option<String>,
    /// First transition out of `queued`.
    pub started_at: Option<DateTime<Utc>>,
    /// Transition into a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// When the engine's local copy becomes due for removal.
    pub source_cleanup_due_at: Option<DateTime<Utc>>,
    /// Whether the engine's local copy was removed.
    pub source_cleanup_done: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One file inside a torrent task, keyed by `(task_id, file_index)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorrentTaskFile {
    /// Opaque identity.
    pub id: Uuid,
    /// Owning task.
    pub task_id: Uuid,
    /// Zero-based index within the torrent.
    pub file_index: i32,
    /// Path relative to the torrent's save directory.
    pub rel_path: String,
    /// Bare file name.
    pub file_name: String,
    /// File size in bytes.
    pub size_bytes: i64,
    /// Whether the user selected this file for ingest.
    pub selected: bool,
    /// Whether the file was uploaded to the blob tier.
    pub uploaded: bool,
    /// Resulting namespace item after a successful upload.
    pub item_id: Option<Uuid>,
    /// Per-file failure detail; does not fail the whole task.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip() {
        for status in [
            TorrentTaskStatus::Queued,
            TorrentTaskStatus::Downloading,
            TorrentTaskStatus::AwaitingSelection,
            TorrentTaskStatus::Uploading,
            TorrentTaskStatus::Completed,
            TorrentTaskStatus::Error,
        ] {
            assert_eq!(TorrentTaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TorrentTaskStatus::parse("paused"), None);
    }

    #[test]
    fn retry_is_valid_only_from_terminal_states() {
        assert!(TorrentTaskStatus::Error.is_retryable());
        assert!(TorrentTaskStatus::Completed.is_retryable());
        assert!(!TorrentTaskStatus::Queued.is_retryable());
        assert!(!TorrentTaskStatus::Downloading.is_retryable());
        assert!(!TorrentTaskStatus::AwaitingSelection.is_retryable());
        assert!(!TorrentTaskStatus::Uploading.is_retryable());
    }

    #[test]
    fn source_kind_labels_round_trip() {
        assert_eq!(TorrentSourceKind::parse("url"), Some(TorrentSourceKind::Url));
        assert_eq!(
            TorrentSourceKind::parse("file"),
            Some(TorrentSourceKind::File)
        );
        assert_eq!(TorrentSourceKind::parse("magnet"), None);
    }
}
