//! Settings-backed admission gates.
//!
//! Each gate caps global in-flight work with a counting semaphore whose
//! capacity tracks the runtime settings row. The cap is re-read before each
//! unit of work, so a settings patch takes effect on the next admission
//! without cancelling anything in flight.

use std::sync::Arc;

use teledrive_core::{DriveError, DriveResult, RuntimeSettings};
use teledrive_data::SettingsStore;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Which concurrency knob a gate enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    /// Global in-flight chunk uploads (`upload_concurrency`).
    Upload,
    /// Global in-flight chunk fetches (`download_concurrency`).
    Download,
}

/// Counting semaphore whose capacity follows a runtime settings knob.
#[derive(Clone)]
pub struct AdmissionGate {
    settings: SettingsStore,
    defaults: RuntimeSettings,
    kind: GateKind,
    semaphore: Arc<Semaphore>,
    granted: Arc<Mutex<usize>>,
}

impl AdmissionGate {
    /// Construct a gate; capacity is established on first acquisition.
    #[must_use]
    pub fn new(settings: SettingsStore, defaults: RuntimeSettings, kind: GateKind) -> Self {
        Self {
            settings,
            defaults,
            kind,
            semaphore: Arc::new(Semaphore::new(0)),
            granted: Arc::new(Mutex::new(0)),
        }
    }

    /// Admit one unit of work, waiting while the gate is saturated.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] when the settings row cannot be
    /// read or the semaphore is closed.
    pub async fn acquire(&self) -> DriveResult<OwnedSemaphorePermit> {
        let settings = self.settings.get_or_init(&self.defaults).await?;
        let cap = capacity_for(self.kind, &settings);
        self.resize_to(cap).await;
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| DriveError::transient("admission.acquire", err))
    }

    /// Converge the semaphore toward `cap` permits.
    ///
    /// Shrinking only forgets currently idle permits; permits held by
    /// in-flight work are reclaimed lazily by later resize calls when they
    /// return to the pool.
    async fn resize_to(&self, cap: usize) {
        let mut granted = self.granted.lock().await;
        if cap > *granted {
            self.semaphore.add_permits(cap - *granted);
            debug!(kind = ?self.kind, from = *granted, to = cap, "admission gate grew");
            *granted = cap;
        } else if cap < *granted {
            let removed = self.semaphore.forget_permits(*granted - cap);
            if removed > 0 {
                debug!(kind = ?self.kind, removed, target = cap, "admission gate shrank");
            }
            *granted -= removed;
        }
    }
}

fn capacity_for(kind: GateKind, settings: &RuntimeSettings) -> usize {
    let configured = match kind {
        GateKind::Upload => settings.upload_concurrency,
        GateKind::Download => settings.download_concurrency,
    };
    usize::try_from(configured.max(1)).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn capacity_follows_the_kind_specific_knob() {
        let mut settings = RuntimeSettings::defaults(Utc::now());
        settings.upload_concurrency = 4;
        settings.download_concurrency = 9;
        assert_eq!(capacity_for(GateKind::Upload, &settings), 4);
        assert_eq!(capacity_for(GateKind::Download, &settings), 9);
    }

    #[test]
    fn capacity_never_drops_below_one() {
        let mut settings = RuntimeSettings::defaults(Utc::now());
        settings.upload_concurrency = -3;
        assert_eq!(capacity_for(GateKind::Upload, &settings), 1);
    }
}
