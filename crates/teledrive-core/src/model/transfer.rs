//! Upload sessions and the transfer history ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a resumable upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Chunks are still being received.
    Uploading,
    /// The object was committed.
    Completed,
    /// The session was aborted or expired.
    Failed,
}

impl SessionStatus {
    /// Stable database label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a database label; `None` for unknown labels.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "uploading" => Some(Self::Uploading),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Transient state of one resumable upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    /// Opaque identity.
    pub id: Uuid,
    /// Placeholder item the chunks attach to.
    pub item_id: Uuid,
    /// Blob-tier chat receiving this session's chunks.
    pub tg_chat_id: i64,
    /// File name supplied by the client.
    pub file_name: String,
    /// MIME type supplied by the client.
    pub mime_type: Option<String>,
    /// Declared total size in bytes.
    pub total_size: i64,
    /// Chunk size negotiated at session start.
    pub chunk_size: i64,
    /// `max(1, ceil(total_size / chunk_size))`.
    pub total_chunks: i32,
    /// Lifecycle state.
    pub status: SessionStatus,
    /// How the client reached the service, kept for observability.
    pub access_method: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent chunk write or status change.
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// Expected byte length of the chunk at `index`.
    ///
    /// Every chunk is `chunk_size` long except the last, which carries the
    /// remainder.
    #[must_use]
    pub const fn expected_chunk_len(&self, index: i32) -> i64 {
        if index == self.total_chunks - 1 {
            let remainder = self.total_size % self.chunk_size;
            if remainder == 0 && self.total_size > 0 {
                self.chunk_size
            } else {
                remainder
            }
        } else {
            self.chunk_size
        }
    }
}

/// Direction of a recorded transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Client-to-drive transfer.
    Upload,
    /// Drive-to-client transfer.
    Download,
}

impl TransferDirection {
    /// Stable database label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }

    /// Parse a database label; `None` for unknown labels.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "upload" => Some(Self::Upload),
            "download" => Some(Self::Download),
            _ => None,
        }
    }
}

/// Final status of a recorded transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// The transfer finished successfully.
    Completed,
    /// The transfer failed.
    Error,
    /// The client cancelled mid-flight.
    Canceled,
}

impl TransferStatus {
    /// Stable database label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Canceled => "canceled",
        }
    }

    /// Parse a database label; `None` for unknown labels.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

/// One row of the transfer history ledger, keyed by
/// `(direction, source_task_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Opaque identity.
    pub id: Uuid,
    /// Transfer direction.
    pub direction: TransferDirection,
    /// Originating task: an upload session id or a download stream id.
    pub source_task_id: Uuid,
    /// Display name of the transferred item.
    pub item_name: String,
    /// Bytes transferred.
    pub size_bytes: i64,
    /// Final status.
    pub status: TransferStatus,
    /// Failure detail when the status is not `completed`.
    pub error: Option<String>,
    /// Whether video fast-start remuxing was applied.
    pub faststart_applied: bool,
    /// Whether a preview was attached during post-processing.
    pub preview_attached: bool,
    /// Transfer start timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Transfer finish timestamp.
    pub finished_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(total_size: i64, chunk_size: i64, total_chunks: i32) -> UploadSession {
        UploadSession {
            id: Uuid::new_v4(),
            item_id: Uuid::new_v4(),
            tg_chat_id: -100_200,
            file_name: "clip.mp4".into(),
            mime_type: Some("video/mp4".into()),
            total_size,
            chunk_size,
            total_chunks,
            status: SessionStatus::Uploading,
            access_method: "web".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn last_chunk_carries_the_remainder() {
        let session = session(25, 10, 3);
        assert_eq!(session.expected_chunk_len(0), 10);
        assert_eq!(session.expected_chunk_len(1), 10);
        assert_eq!(session.expected_chunk_len(2), 5);
    }

    #[test]
    fn exact_multiple_keeps_full_last_chunk() {
        let session = session(20, 10, 2);
        assert_eq!(session.expected_chunk_len(1), 10);
    }

    #[test]
    fn status_labels_round_trip() {
        for status in [
            SessionStatus::Uploading,
            SessionStatus::Completed,
            SessionStatus::Failed,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        for direction in [TransferDirection::Upload, TransferDirection::Download] {
            assert_eq!(TransferDirection::parse(direction.as_str()), Some(direction));
        }
        for status in [
            TransferStatus::Completed,
            TransferStatus::Error,
            TransferStatus::Canceled,
        ] {
            assert_eq!(TransferStatus::parse(status.as_str()), Some(status));
        }
    }
}
