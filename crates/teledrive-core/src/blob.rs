//! Narrow client interface for the chat-platform blob tier.
//!
//! Chunk bodies live as opaque messages addressed by `(chat_id, message_id)`.
//! The platform rate-limits per chat, so callers serialize deletes per chat
//! and keep fetch concurrency bounded.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DriveResult;

/// Coordinates of one stored chunk message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Chat holding the message.
    pub chat_id: i64,
    /// Message identifier within the chat.
    pub message_id: i64,
}

/// Result of persisting one chunk body to the blob tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentChunk {
    /// Message identifier assigned by the platform.
    pub message_id: i64,
    /// Platform file identifier usable for re-fetch.
    pub file_id: String,
    /// Platform file identifier stable across chats.
    pub file_unique_id: String,
}

/// Outcome of a blob-tier delete attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The message was removed.
    Deleted,
    /// The message was already gone; treat as success.
    NotFound,
    /// The delete failed in a retryable way.
    Failed {
        /// Platform-reported failure detail.
        message: String,
    },
}

/// Client interface to the remote blob store.
///
/// Implementations are external collaborators; the workspace only ships
/// in-memory fakes for tests.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist one chunk body, returning the assigned message reference.
    ///
    /// Callers must tolerate duplicate sends by recording the returned
    /// message id; the platform does not deduplicate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DriveError::Transient`] for retryable platform
    /// failures and [`crate::DriveError::Permanent`] otherwise.
    async fn send_chunk(&self, chat_id: i64, bytes: Vec<u8>) -> DriveResult<SentChunk>;

    /// Fetch one chunk body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DriveError::Transient`] for retryable platform
    /// failures and [`crate::DriveError::Permanent`] when the reference is
    /// gone.
    async fn fetch_chunk(&self, chat_id: i64, message_id: i64) -> DriveResult<Vec<u8>>;

    /// Delete one chunk message.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that are not expressible as a
    /// [`DeleteOutcome`], e.g. a malformed reference.
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> DriveResult<DeleteOutcome>;
}

const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 30_000;

/// Capped exponential backoff delay for the given zero-based attempt.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let shift = attempt.min(6);
    Duration::from_millis((BACKOFF_BASE_MS << shift).min(BACKOFF_CAP_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(5), Duration::from_millis(16_000));
        assert_eq!(backoff_delay(6), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(60), Duration::from_millis(30_000));
    }
}
