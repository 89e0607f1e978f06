//! Deferred removal of finished torrents' engine-local payload copies.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use teledrive_core::{DriveError, TorrentEngine, TorrentTask};
use teledrive_data::TorrentStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const FAILURE_POSTPONE_MINUTES: i64 = 15;

/// Claims due cleanup tasks and removes their local payload.
pub struct SourceCleanupWorker {
    torrents: TorrentStore,
    engine: Arc<dyn TorrentEngine>,
    interval: Duration,
}

impl SourceCleanupWorker {
    /// Construct the worker with the default cadence.
    #[must_use]
    pub fn new(torrents: TorrentStore, engine: Arc<dyn TorrentEngine>) -> Self {
        Self {
            torrents,
            engine,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Override the scan cadence.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Spawn the cleanup loop; it exits when `shutdown` flips to `true`.
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
            info!("torrent source cleanup worker stopped");
        })
    }

    /// Claim and process every due task.
    pub async fn run_once(&self) {
        loop {
            let task = match self.torrents.claim_next_due_cleanup(Utc::now()).await {
                Ok(task) => task,
                Err(DriveError::NotFound { .. }) => return,
                Err(err) => {
                    warn!(error = %err, "failed to claim due torrent cleanup");
                    return;
                }
            };
            self.cleanup_task(&task).await;
        }
    }

    async fn cleanup_task(&self, task: &TorrentTask) {
        let now = Utc::now();
        let Some(handle) = task.engine_handle.as_deref() else {
            // Nothing left in the engine to remove; close the book.
            if let Err(err) = self.torrents.mark_cleanup_done(task.id, now).await {
                warn!(error = %err, task_id = %task.id, "failed to mark cleanup done");
            }
            return;
        };

        match self.engine.remove(handle, true).await {
            Ok(()) | Err(DriveError::NotFound { .. }) => {
                if let Err(err) = self.torrents.mark_cleanup_done(task.id, now).await {
                    warn!(error = %err, task_id = %task.id, "failed to mark cleanup done");
                    return;
                }
                info!(task_id = %task.id, "torrent source cleanup completed");
            }
            Err(err) => {
                let next_due = now + ChronoDuration::minutes(FAILURE_POSTPONE_MINUTES);
                warn!(
                    error = %err,
                    task_id = %task.id,
                    next_due = %next_due,
                    "torrent source cleanup failed; postponed"
                );
                if let Err(postpone_err) = self
                    .torrents
                    .postpone_cleanup(task.id, next_due, &err.to_string(), now)
                    .await
                {
                    warn!(
                        error = %postpone_err,
                        task_id = %task.id,
                        "failed to postpone torrent cleanup"
                    );
                }
            }
        }
    }
}
