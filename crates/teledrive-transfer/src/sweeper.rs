//! Background sweeper for stale upload sessions.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use teledrive_core::{RuntimeSettings, SessionStatus, UploadSession};
use teledrive_data::{ChunkStore, DeleteFailureStore, ItemStore, SessionStore, SettingsStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const SWEEP_BATCH: i64 = 100;
const EXPIRED_SESSION_REASON: &str = "expired upload session";

/// Expires unfinished sessions past their TTL and reclaims their storage.
///
/// For each expired session: mark it failed, enqueue blob deletes for every
/// recorded chunk, then drop the placeholder item (chunk rows cascade).
pub struct SessionSweeper {
    sessions: SessionStore,
    chunks: ChunkStore,
    items: ItemStore,
    failures: DeleteFailureStore,
    settings: SettingsStore,
    defaults: RuntimeSettings,
}

impl SessionSweeper {
    /// Construct the sweeper over the shared repositories.
    #[must_use]
    pub const fn new(
        sessions: SessionStore,
        chunks: ChunkStore,
        items: ItemStore,
        failures: DeleteFailureStore,
        settings: SettingsStore,
        defaults: RuntimeSettings,
    ) -> Self {
        Self {
            sessions,
            chunks,
            items,
            failures,
            settings,
            defaults,
        }
    }

    /// Spawn the sweep loop; the cadence follows the runtime settings and is
    /// re-read after every pass.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let interval = self.current_interval().await;
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(interval) => {
                        self.run_once().await;
                    }
                }
            }
            info!("upload session sweeper stopped");
        })
    }

    async fn current_interval(&self) -> Duration {
        match self.settings.get_or_init(&self.defaults).await {
            Ok(settings) => Duration::from_secs(
                u64::try_from(settings.upload_session_cleanup_interval_min.max(1))
                    .unwrap_or(30)
                    * 60,
            ),
            Err(err) => {
                warn!(error = %err, "failed to read sweeper cadence; using default");
                Duration::from_secs(30 * 60)
            }
        }
    }

    /// One sweep pass over every expired session.
    pub async fn run_once(&self) {
        let settings = match self.settings.get_or_init(&self.defaults).await {
            Ok(settings) => settings,
            Err(err) => {
                warn!(error = %err, "failed to read settings for session sweep");
                return;
            }
        };
        let now = Utc::now();
        let cutoff =
            now - ChronoDuration::hours(i64::from(settings.upload_session_ttl_hours.max(1)));
        loop {
            let expired = match self.sessions.list_expired(cutoff, SWEEP_BATCH).await {
                Ok(expired) => expired,
                Err(err) => {
                    warn!(error = %err, "failed to scan expired upload sessions");
                    return;
                }
            };
            if expired.is_empty() {
                return;
            }
            let batch_len = expired.len();
            for session in expired {
                self.expire_session(&session).await;
            }
            if i64::try_from(batch_len).unwrap_or(i64::MAX) < SWEEP_BATCH {
                return;
            }
        }
    }

    async fn expire_session(&self, session: &UploadSession) {
        let now = Utc::now();
        if session.status != SessionStatus::Failed {
            if let Err(err) = self
                .sessions
                .set_status(session.id, SessionStatus::Failed, now)
                .await
            {
                warn!(error = %err, session_id = %session.id, "failed to mark session expired");
                return;
            }
        }

        let refs = match self.chunks.refs_for_item(session.item_id).await {
            Ok(refs) => refs,
            Err(err) => {
                warn!(error = %err, session_id = %session.id, "failed to enumerate session chunks");
                return;
            }
        };
        for chunk in refs {
            if let Err(err) = self
                .failures
                .enqueue_pending(chunk, Some(session.item_id), None, EXPIRED_SESSION_REASON, now)
                .await
            {
                warn!(
                    error = %err,
                    session_id = %session.id,
                    message_id = chunk.message_id,
                    "failed to enqueue blob delete for expired session"
                );
                return;
            }
        }

        // The placeholder item goes last so a crash leaves rows the next
        // sweep can still find.
        if let Err(err) = self.items.delete(session.item_id).await {
            warn!(error = %err, session_id = %session.id, "failed to drop placeholder item");
            return;
        }
        if let Err(err) = self.sessions.delete(session.id).await {
            warn!(error = %err, session_id = %session.id, "failed to drop expired session row");
            return;
        }
        info!(session_id = %session.id, item_id = %session.item_id, "expired upload session reclaimed");
    }
}
