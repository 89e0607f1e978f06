//! Resumable upload sessions.
//!
//! Clients own chunk indexes and may send chunks out of order, in parallel,
//! and more than once. A duplicate chunk write is a no-op whose orphaned
//! blob message is handed to the delete retry ledger.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teledrive_core::{
    BlobStore, Chunk, ChunkRef, DriveError, DriveResult, Item, RuntimeSettings, SessionStatus,
    TransferDirection, TransferRecord, TransferStatus, UploadSession, guess_item_kind,
};
use teledrive_data::{
    ChunkStore, DeleteFailureStore, HistoryStore, ItemStore, SessionStore, SettingsStore,
};
use teledrive_telemetry::Metrics;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::admission::AdmissionGate;

/// Outcome flags of the post-processing hooks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostProcessOutcome {
    /// Video fast-start remuxing was applied.
    pub faststart_applied: bool,
    /// A preview was attached to the item.
    pub preview_attached: bool,
}

/// Hook invoked after a successful commit.
///
/// Implementations report what they did; a hook failure never fails the
/// upload itself.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    /// Post-process the committed item.
    async fn process(&self, item: &Item, session: &UploadSession) -> PostProcessOutcome;
}

/// A session plus the chunk indexes already persisted for it.
#[derive(Debug, Clone)]
pub struct SessionView {
    /// The session row.
    pub session: UploadSession,
    /// Persisted chunk indexes, ascending; only ever grows.
    pub uploaded_chunks: Vec<i32>,
}

/// Result of committing a session.
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    /// The committed item with its final size.
    pub item: Item,
    /// The completed session row.
    pub session: UploadSession,
    /// What the post-processing hooks did.
    pub post_process: PostProcessOutcome,
}

/// Resumable upload protocol implementation.
#[derive(Clone)]
pub struct UploadManager {
    items: ItemStore,
    chunks: ChunkStore,
    sessions: SessionStore,
    history: HistoryStore,
    failures: DeleteFailureStore,
    settings: SettingsStore,
    defaults: RuntimeSettings,
    blob: Arc<dyn BlobStore>,
    gate: AdmissionGate,
    metrics: Metrics,
    post_processor: Option<Arc<dyn PostProcessor>>,
}

impl UploadManager {
    /// Construct the manager over the shared repositories.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        items: ItemStore,
        chunks: ChunkStore,
        sessions: SessionStore,
        history: HistoryStore,
        failures: DeleteFailureStore,
        settings: SettingsStore,
        defaults: RuntimeSettings,
        blob: Arc<dyn BlobStore>,
        gate: AdmissionGate,
        metrics: Metrics,
    ) -> Self {
        Self {
            items,
            chunks,
            sessions,
            history,
            failures,
            settings,
            defaults,
            blob,
            gate,
            metrics,
            post_processor: None,
        }
    }

    /// Attach a post-processing hook.
    #[must_use]
    pub fn with_post_processor(mut self, post_processor: Arc<dyn PostProcessor>) -> Self {
        self.post_processor = Some(post_processor);
        self
    }

    /// Open a session: create the placeholder item and the session row.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] for an empty name, a negative size,
    /// or a non-folder parent.
    pub async fn begin(
        &self,
        parent_id: Option<Uuid>,
        name: &str,
        mime_type: Option<&str>,
        declared_size: i64,
        tg_chat_id: i64,
        access_method: &str,
        now: DateTime<Utc>,
    ) -> DriveResult<UploadSession> {
        if declared_size < 0 {
            return Err(DriveError::bad_input("declared size must not be negative"));
        }
        let settings = self.settings.get_or_init(&self.defaults).await?;
        let chunk_size = settings.upload_chunk_size_bytes.max(1);
        let total_chunks = i32::try_from(
            (declared_size as u64)
                .div_ceil(chunk_size as u64)
                .max(1),
        )
        .map_err(|_| DriveError::bad_input("declared size needs too many chunks"))?;

        let kind = guess_item_kind(name, mime_type);
        let item = self
            .items
            .create_file_item(parent_id, kind, name, declared_size, mime_type, now)
            .await?;

        let session = UploadSession {
            id: Uuid::new_v4(),
            item_id: item.id,
            tg_chat_id,
            file_name: item.name.clone(),
            mime_type: mime_type.map(ToOwned::to_owned),
            total_size: declared_size,
            chunk_size,
            total_chunks,
            status: SessionStatus::Uploading,
            access_method: access_method.to_owned(),
            created_at: now,
            updated_at: now,
        };
        self.sessions.insert(&session).await?;
        info!(
            session_id = %session.id,
            item_id = %item.id,
            total_chunks,
            chunk_size,
            "upload session opened"
        );
        Ok(session)
    }

    /// Fetch a session together with its persisted chunk indexes.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the session is absent.
    pub async fn get(&self, session_id: Uuid) -> DriveResult<SessionView> {
        let session = self.sessions.get(session_id).await?;
        let uploaded_chunks = self.chunks.uploaded_indices(session.item_id).await?;
        Ok(SessionView {
            session,
            uploaded_chunks,
        })
    }

    /// Persist one chunk.
    ///
    /// The body is uploaded to the blob tier first; the chunk row records
    /// the returned message reference. A duplicate index is a no-op and the
    /// second blob message is enqueued for deletion.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] for an out-of-range index or a wrong
    /// chunk length, and [`DriveError::Transient`] when the blob tier fails
    /// (the chunk is not recorded; the client retries).
    pub async fn put_chunk(
        &self,
        session_id: Uuid,
        chunk_index: i32,
        bytes: Vec<u8>,
        now: DateTime<Utc>,
    ) -> DriveResult<()> {
        let session = self.sessions.get(session_id).await?;
        if session.status != SessionStatus::Uploading {
            return Err(DriveError::bad_input(
                "upload session is no longer accepting chunks",
            ));
        }
        if chunk_index < 0 || chunk_index >= session.total_chunks {
            return Err(DriveError::bad_input(format!(
                "chunk index {chunk_index} is outside 0..{}",
                session.total_chunks
            )));
        }
        let expected = session.expected_chunk_len(chunk_index);
        let actual = i64::try_from(bytes.len())
            .map_err(|_| DriveError::bad_input("chunk body exceeds supported length"))?;
        if actual != expected {
            return Err(DriveError::bad_input(format!(
                "chunk {chunk_index} must be {expected} bytes, got {actual}"
            )));
        }

        let permit = self.gate.acquire().await?;
        let sent = self.blob.send_chunk(session.tg_chat_id, bytes).await?;
        drop(permit);

        let inserted = self
            .chunks
            .insert(&Chunk {
                id: Uuid::new_v4(),
                item_id: session.item_id,
                chunk_index,
                chunk_size: expected,
                tg_chat_id: session.tg_chat_id,
                tg_message_id: sent.message_id,
                tg_file_id: sent.file_id,
                tg_file_unique_id: sent.file_unique_id,
                created_at: now,
            })
            .await?;
        if inserted {
            self.metrics.record_chunk_uploaded();
        } else {
            // Client retry after a successful write: the fresh blob message
            // is unreferenced and must be reclaimed.
            debug!(
                session_id = %session_id,
                chunk_index,
                message_id = sent.message_id,
                "duplicate chunk write; orphan scheduled for cleanup"
            );
            self.failures
                .enqueue_pending(
                    ChunkRef {
                        chat_id: session.tg_chat_id,
                        message_id: sent.message_id,
                    },
                    Some(session.item_id),
                    None,
                    "orphaned duplicate chunk upload",
                    now,
                )
                .await?;
        }
        self.sessions.touch(session_id, now).await?;
        Ok(())
    }

    /// Commit the session once every chunk is present.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] when chunks are missing or the
    /// recorded sizes do not sum to the declared size.
    pub async fn complete(
        &self,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> DriveResult<CompletedUpload> {
        let session = self.sessions.get(session_id).await?;
        if session.status != SessionStatus::Uploading {
            return Err(DriveError::bad_input(
                "upload session is not open for commit",
            ));
        }
        let indices = self.chunks.uploaded_indices(session.item_id).await?;
        let expected: Vec<i32> = (0..session.total_chunks).collect();
        if indices != expected {
            return Err(DriveError::bad_input(format!(
                "upload incomplete: {}/{} chunks present",
                indices.len(),
                session.total_chunks
            )));
        }
        let recorded = self.chunks.total_size(session.item_id).await?;
        if recorded != session.total_size {
            return Err(DriveError::bad_input(format!(
                "chunk sizes sum to {recorded}, declared {}",
                session.total_size
            )));
        }

        let item = self
            .items
            .update_size(session.item_id, recorded, now)
            .await?;
        let session = self
            .sessions
            .set_status(session_id, SessionStatus::Completed, now)
            .await?;

        let post_process = match &self.post_processor {
            Some(processor) => processor.process(&item, &session).await,
            None => PostProcessOutcome::default(),
        };

        self.history
            .upsert(&TransferRecord {
                id: Uuid::new_v4(),
                direction: TransferDirection::Upload,
                source_task_id: session.id,
                item_name: item.name.clone(),
                size_bytes: recorded,
                status: TransferStatus::Completed,
                error: None,
                faststart_applied: post_process.faststart_applied,
                preview_attached: post_process.preview_attached,
                started_at: Some(session.created_at),
                finished_at: Some(now),
                created_at: now,
                updated_at: now,
            })
            .await?;
        self.metrics.record_transfer("upload", "completed");
        info!(
            session_id = %session.id,
            item_id = %item.id,
            size_bytes = recorded,
            "upload committed"
        );
        Ok(CompletedUpload {
            item,
            session,
            post_process,
        })
    }

    /// Abort a session; the sweeper reclaims its chunks later.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the session is absent.
    pub async fn abort(&self, session_id: Uuid, now: DateTime<Utc>) -> DriveResult<UploadSession> {
        let session = self
            .sessions
            .set_status(session_id, SessionStatus::Failed, now)
            .await?;
        if let Err(err) = self
            .history
            .upsert(&TransferRecord {
                id: Uuid::new_v4(),
                direction: TransferDirection::Upload,
                source_task_id: session.id,
                item_name: session.file_name.clone(),
                size_bytes: session.total_size,
                status: TransferStatus::Canceled,
                error: None,
                faststart_applied: false,
                preview_attached: false,
                started_at: Some(session.created_at),
                finished_at: Some(now),
                created_at: now,
                updated_at: now,
            })
            .await
        {
            warn!(error = %err, session_id = %session_id, "failed to record aborted upload");
        }
        self.metrics.record_transfer("upload", "canceled");
        info!(session_id = %session_id, "upload session aborted");
        Ok(session)
    }
}
