//! Trash lifecycle and the two-phase hard delete.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use teledrive_core::{BlobStore, DeleteOutcome, DriveResult, Item};
use teledrive_data::{ChunkStore, DeleteFailureStore, ItemStore};
use teledrive_telemetry::Metrics;
use tracing::{info, warn};
use uuid::Uuid;

/// Telemetry returned by a hard delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardDeleteStats {
    /// Blob references enumerated under the subtree.
    pub attempted: u64,
    /// References removed (or already gone) at the blob tier.
    pub deleted: u64,
    /// References left to the retry ledger.
    pub failed: u64,
}

/// Orchestrates soft deletion, restore, and storage reclamation.
#[derive(Clone)]
pub struct TrashService {
    items: ItemStore,
    chunks: ChunkStore,
    failures: DeleteFailureStore,
    blob: Arc<dyn BlobStore>,
    metrics: Metrics,
}

impl TrashService {
    /// Construct the service over the shared repositories.
    #[must_use]
    pub fn new(
        items: ItemStore,
        chunks: ChunkStore,
        failures: DeleteFailureStore,
        blob: Arc<dyn BlobStore>,
        metrics: Metrics,
    ) -> Self {
        Self {
            items,
            chunks,
            failures,
            blob,
            metrics,
        }
    }

    /// Soft-delete an item and, for folders, every descendant.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::NotFound`] when the item is
    /// absent.
    pub async fn trash(&self, item_id: Uuid, now: DateTime<Utc>) -> DriveResult<u64> {
        let item = self.items.get(item_id).await?;
        let affected = self
            .items
            .set_trashed_by_path_prefix(&item.path, Some(now), now)
            .await?;
        info!(item_id = %item_id, path = %item.path, affected, "subtree moved to trash");
        Ok(affected)
    }

    /// Clear the trash marker on an item and its descendants.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::NotFound`] when the item is
    /// absent.
    pub async fn restore(&self, item_id: Uuid, now: DateTime<Utc>) -> DriveResult<u64> {
        let item = self.items.get(item_id).await?;
        let affected = self
            .items
            .set_trashed_by_path_prefix(&item.path, None, now)
            .await?;
        info!(item_id = %item_id, path = %item.path, affected, "subtree restored from trash");
        Ok(affected)
    }

    /// Paged listing of trashed subtree roots.
    ///
    /// # Errors
    ///
    /// Returns the underlying repository error.
    pub async fn list(&self, page: i64, page_size: i64) -> DriveResult<(Vec<Item>, i64)> {
        self.items.list_trash(page, page_size).await
    }

    /// Permanently remove an item's subtree.
    ///
    /// Phase one attempts every blob-tier delete, upserting failures into
    /// the retry ledger. Phase two removes the metadata rows regardless; the
    /// ledger guarantees eventual blob reclamation.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::NotFound`] when the item is
    /// absent. Blob-tier failures never fail the call.
    pub async fn hard_delete(
        &self,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> DriveResult<HardDeleteStats> {
        let item = self.items.get(item_id).await?;
        let refs = self.chunks.refs_by_path_prefix(&item.path).await?;

        let mut stats = HardDeleteStats::default();
        for chunk in refs {
            stats.attempted += 1;
            match self.blob.delete_message(chunk.chat_id, chunk.message_id).await {
                Ok(DeleteOutcome::Deleted) => {
                    stats.deleted += 1;
                    self.metrics.record_blob_delete("deleted");
                }
                Ok(DeleteOutcome::NotFound) => {
                    stats.deleted += 1;
                    self.metrics.record_blob_delete("already_gone");
                }
                Ok(DeleteOutcome::Failed { message }) => {
                    stats.failed += 1;
                    self.metrics.record_blob_delete("failed");
                    self.failures
                        .record_failed_attempt(
                            chunk,
                            Some(item.id),
                            Some(&item.path),
                            &message,
                            now,
                        )
                        .await?;
                }
                Err(err) => {
                    stats.failed += 1;
                    self.metrics.record_blob_delete("failed");
                    warn!(
                        error = %err,
                        chat_id = chunk.chat_id,
                        message_id = chunk.message_id,
                        "blob delete attempt errored"
                    );
                    self.failures
                        .record_failed_attempt(
                            chunk,
                            Some(item.id),
                            Some(&item.path),
                            &err.to_string(),
                            now,
                        )
                        .await?;
                }
            }
        }

        let removed_rows = self.items.delete_by_path_prefix(&item.path).await?;
        info!(
            item_id = %item_id,
            path = %item.path,
            removed_rows,
            attempted = stats.attempted,
            deleted = stats.deleted,
            failed = stats.failed,
            "subtree hard-deleted"
        );
        Ok(stats)
    }

    /// Hard-delete every trashed subtree root.
    ///
    /// # Errors
    ///
    /// Returns the first repository error; blob-tier failures are absorbed
    /// into the returned stats.
    pub async fn empty_trash(&self, now: DateTime<Utc>) -> DriveResult<HardDeleteStats> {
        let mut totals = HardDeleteStats::default();
        loop {
            let (roots, _) = self.items.list_trash(1, 200).await?;
            if roots.is_empty() {
                break;
            }
            for root in roots {
                let stats = self.hard_delete(root.id, now).await?;
                totals.attempted += stats.attempted;
                totals.deleted += stats.deleted;
                totals.failed += stats.failed;
            }
        }
        Ok(totals)
    }
}
