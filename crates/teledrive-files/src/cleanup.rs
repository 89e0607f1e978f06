//! Background retry worker for the blob delete ledger.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use teledrive_core::{BlobStore, ChunkRef, DeleteFailure, DeleteOutcome};
use teledrive_data::DeleteFailureStore;
use teledrive_telemetry::Metrics;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_BATCH_SIZE: i64 = 50;

/// Periodically retries unresolved blob-tier deletes.
///
/// Retries never give up; the ledger row stays visible until the blob tier
/// confirms the message is gone.
pub struct DeleteRetryWorker {
    failures: DeleteFailureStore,
    blob: Arc<dyn BlobStore>,
    metrics: Metrics,
    interval: Duration,
    batch_size: i64,
}

impl DeleteRetryWorker {
    /// Construct a worker with the default cadence.
    #[must_use]
    pub fn new(failures: DeleteFailureStore, blob: Arc<dyn BlobStore>, metrics: Metrics) -> Self {
        Self {
            failures,
            blob,
            metrics,
            interval: DEFAULT_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the scan cadence.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the worker loop; it exits when `shutdown` flips to `true`.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
            debug!("blob delete retry worker stopped");
        })
    }

    /// Drain the unresolved ledger in bounded batches, yielding between
    /// batches to avoid starving other work.
    pub async fn run_once(&self) {
        loop {
            let batch = match self.failures.list_unresolved(self.batch_size).await {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(error = %err, "failed to scan delete retry ledger");
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }
            let batch_len = batch.len();
            for entry in batch {
                self.retry_entry(&entry).await;
            }
            if i64::try_from(batch_len).unwrap_or(i64::MAX) < self.batch_size {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    async fn retry_entry(&self, entry: &DeleteFailure) {
        let now = Utc::now();
        let chunk = ChunkRef {
            chat_id: entry.tg_chat_id,
            message_id: entry.tg_message_id,
        };
        let outcome = self.blob.delete_message(chunk.chat_id, chunk.message_id).await;
        match outcome {
            Ok(DeleteOutcome::Deleted | DeleteOutcome::NotFound) => {
                self.metrics.record_blob_delete("deleted");
                if let Err(err) = self.failures.mark_resolved(entry.id, now).await {
                    warn!(error = %err, failure_id = %entry.id, "failed to mark delete failure resolved");
                }
            }
            Ok(DeleteOutcome::Failed { message }) => {
                self.metrics.record_blob_delete("failed");
                if let Err(err) = self
                    .failures
                    .record_retry_failure(entry.id, &message, now)
                    .await
                {
                    warn!(error = %err, failure_id = %entry.id, "failed to record delete retry");
                }
            }
            Err(err) => {
                self.metrics.record_blob_delete("failed");
                let detail = err.to_string();
                if let Err(err) = self
                    .failures
                    .record_retry_failure(entry.id, &detail, now)
                    .await
                {
                    warn!(error = %err, failure_id = %entry.id, "failed to record delete retry");
                }
            }
        }
    }
}
