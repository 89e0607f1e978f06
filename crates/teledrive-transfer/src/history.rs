//! Background retention worker for the transfer history ledger.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use teledrive_data::HistoryStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60 * 24);
const DEFAULT_RETENTION_DAYS: i64 = 90;
const SWEEP_LIMIT: i64 = 500;

/// Periodically trims old transfer history rows in bounded sweeps.
pub struct HistoryCleanupWorker {
    history: HistoryStore,
    interval: Duration,
    retention: ChronoDuration,
}

impl HistoryCleanupWorker {
    /// Construct a worker with the default daily cadence and 90-day
    /// retention.
    #[must_use]
    pub fn new(history: HistoryStore) -> Self {
        Self {
            history,
            interval: DEFAULT_INTERVAL,
            retention: ChronoDuration::days(DEFAULT_RETENTION_DAYS),
        }
    }

    /// Override the sweep cadence.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the retention window.
    #[must_use]
    pub const fn with_retention(mut self, retention: ChronoDuration) -> Self {
        self.retention = retention;
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
            info!("transfer history cleanup worker stopped");
        })
    }

    /// Sweep until one pass removes nothing, keeping each transaction small.
    pub async fn run_once(&self) {
        let cutoff = Utc::now() - self.retention;
        let mut total = 0_u64;
        loop {
            match self.history.cleanup_older_than(cutoff, SWEEP_LIMIT).await {
                Ok(0) => break,
                Ok(removed) => {
                    total += removed;
                    tokio::task::yield_now().await;
                }
                Err(err) => {
                    warn!(error = %err, "transfer history cleanup sweep failed");
                    return;
                }
            }
        }
        if total > 0 {
            debug!(removed = total, "trimmed transfer history");
        }
    }
}
