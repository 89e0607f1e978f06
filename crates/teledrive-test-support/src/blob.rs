//! In-memory blob store fake with failure injection.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use async_trait::async_trait;
use teledrive_core::{BlobStore, DeleteOutcome, DriveError, DriveResult, SentChunk};

/// Blob tier replacement backed by a process-local map.
///
/// Supports injecting bounded failure runs for sends, fetches, and deletes
/// so callers can exercise their retry paths.
#[derive(Default)]
pub struct MemoryBlobStore {
    messages: Mutex<HashMap<(i64, i64), Vec<u8>>>,
    next_message_id: AtomicI64,
    failing_sends: AtomicU32,
    failing_fetches: AtomicU32,
    failing_deletes: Mutex<HashMap<i64, u32>>,
}

impl MemoryBlobStore {
    /// Fail the next `times` sends with a transient error.
    pub fn fail_next_sends(&self, times: u32) {
        self.failing_sends.store(times, Ordering::SeqCst);
    }

    /// Fail the next `times` fetches with a transient error.
    pub fn fail_next_fetches(&self, times: u32) {
        self.failing_fetches.store(times, Ordering::SeqCst);
    }

    /// Fail the next `times` deletes of one message.
    pub fn fail_delete_times(&self, message_id: i64, times: u32) {
        self.failing_deletes
            .lock()
            .expect("lock poisoned")
            .insert(message_id, times);
    }

    /// Number of messages currently stored.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.lock().expect("lock poisoned").len()
    }

    /// Raw stored bytes for one message, if present.
    #[must_use]
    pub fn message_bytes(&self, chat_id: i64, message_id: i64) -> Option<Vec<u8>> {
        self.messages
            .lock()
            .expect("lock poisoned")
            .get(&(chat_id, message_id))
            .cloned()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current > 0 { Some(current - 1) } else { None }
            })
            .is_ok()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn send_chunk(&self, chat_id: i64, bytes: Vec<u8>) -> DriveResult<SentChunk> {
        if Self::take_failure(&self.failing_sends) {
            return Err(DriveError::transient(
                "blob.send_chunk",
                std::io::Error::new(std::io::ErrorKind::TimedOut, "injected send failure"),
            ));
        }
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.messages
            .lock()
            .expect("lock poisoned")
            .insert((chat_id, message_id), bytes);
        Ok(SentChunk {
            message_id,
            file_id: format!("file-{message_id}"),
            file_unique_id: format!("unique-{message_id}"),
        })
    }

    async fn fetch_chunk(&self, chat_id: i64, message_id: i64) -> DriveResult<Vec<u8>> {
        if Self::take_failure(&self.failing_fetches) {
            return Err(DriveError::transient(
                "blob.fetch_chunk",
                std::io::Error::new(std::io::ErrorKind::TimedOut, "injected fetch failure"),
            ));
        }
        self.messages
            .lock()
            .expect("lock poisoned")
            .get(&(chat_id, message_id))
            .cloned()
            .ok_or_else(|| {
                DriveError::Permanent {
                    operation: "blob.fetch_chunk",
                    source: format!("message {message_id} is gone from chat {chat_id}").into(),
                }
            })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> DriveResult<DeleteOutcome> {
        {
            let mut failing = self.failing_deletes.lock().expect("lock poisoned");
            if let Some(remaining) = failing.get_mut(&message_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(DeleteOutcome::Failed {
                        message: "injected delete failure".into(),
                    });
                }
                failing.remove(&message_id);
            }
        }
        let removed = self
            .messages
            .lock()
            .expect("lock poisoned")
            .remove(&(chat_id, message_id));
        Ok(if removed.is_some() {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_deletes_messages() {
        let blob = MemoryBlobStore::default();
        let sent = blob.send_chunk(7, vec![1, 2, 3]).await.expect("send");
        assert_eq!(blob.message_bytes(7, sent.message_id), Some(vec![1, 2, 3]));
        assert_eq!(
            blob.fetch_chunk(7, sent.message_id).await.expect("fetch"),
            vec![1, 2, 3]
        );

        assert_eq!(
            blob.delete_message(7, sent.message_id).await.expect("delete"),
            DeleteOutcome::Deleted
        );
        assert_eq!(
            blob.delete_message(7, sent.message_id).await.expect("delete"),
            DeleteOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn injected_failures_are_bounded() {
        let blob = MemoryBlobStore::default();
        blob.fail_next_sends(1);
        assert!(blob.send_chunk(7, vec![0]).await.is_err());
        assert!(blob.send_chunk(7, vec![0]).await.is_ok());

        blob.fail_next_fetches(2);
        let sent = blob.send_chunk(7, vec![9]).await.expect("send");
        assert!(blob.fetch_chunk(7, sent.message_id).await.is_err());
        assert!(blob.fetch_chunk(7, sent.message_id).await.is_err());
        assert!(blob.fetch_chunk(7, sent.message_id).await.is_ok());
    }
}
