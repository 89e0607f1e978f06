//! Scripted torrent engine fake.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use teledrive_core::{DriveError, DriveResult, EngineSource, EngineStatus, TorrentEngine};

/// Torrent engine replacement that replays a scripted status sequence.
///
/// Each [`TorrentEngine::status`] call pops the next scripted snapshot; the
/// final snapshot repeats once the script is exhausted.
#[derive(Default)]
pub struct ScriptedTorrentEngine {
    script: Mutex<VecDeque<EngineStatus>>,
    last: Mutex<Option<EngineStatus>>,
    next_handle: AtomicU64,
    added: Mutex<Vec<EngineSource>>,
    removed: Mutex<Vec<(String, bool)>>,
    paused: Mutex<Vec<String>>,
    resumed: Mutex<Vec<String>>,
    fail_removes: AtomicU64,
}

impl ScriptedTorrentEngine {
    /// Build an engine that replays `statuses` in order.
    #[must_use]
    pub fn with_script(statuses: Vec<EngineStatus>) -> Self {
        Self {
            script: Mutex::new(statuses.into()),
            ..Self::default()
        }
    }

    /// Fail the next `times` remove calls with a transient error.
    pub fn fail_next_removes(&self, times: u64) {
        self.fail_removes.store(times, Ordering::SeqCst);
    }

    /// Sources handed to [`TorrentEngine::add_torrent`] so far.
    #[must_use]
    pub fn added(&self) -> Vec<EngineSource> {
        self.added.lock().expect("lock poisoned").clone()
    }

    /// `(handle, delete_local_data)` pairs from remove calls so far.
    #[must_use]
    pub fn removed(&self) -> Vec<(String, bool)> {
        self.removed.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl TorrentEngine for ScriptedTorrentEngine {
    async fn add_torrent(&self, source: &EngineSource) -> DriveResult<String> {
        self.added.lock().expect("lock poisoned").push(source.clone());
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("handle-{handle}"))
    }

    async fn status(&self, _handle: &str) -> DriveResult<EngineStatus> {
        let mut script = self.script.lock().expect("lock poisoned");
        if let Some(next) = script.pop_front() {
            *self.last.lock().expect("lock poisoned") = Some(next.clone());
            return Ok(next);
        }
        self.last
            .lock()
            .expect("lock poisoned")
            .clone()
            .ok_or(DriveError::not_found("torrent status"))
    }

    async fn remove(&self, handle: &str, delete_local_data: bool) -> DriveResult<()> {
        let failing = self
            .fail_removes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current > 0 { Some(current - 1) } else { None }
            })
            .is_ok();
        if failing {
            return Err(DriveError::transient(
                "engine.remove",
                std::io::Error::new(std::io::ErrorKind::WouldBlock, "injected engine busy"),
            ));
        }
        self.removed
            .lock()
            .expect("lock poisoned")
            .push((handle.to_owned(), delete_local_data));
        Ok(())
    }

    async fn pause(&self, handle: &str) -> DriveResult<()> {
        self.paused.lock().expect("lock poisoned").push(handle.to_owned());
        Ok(())
    }

    async fn resume(&self, handle: &str) -> DriveResult<()> {
        self.resumed
            .lock()
            .expect("lock poisoned")
            .push(handle.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn status(progress: f64) -> EngineStatus {
        EngineStatus {
            name: Some("sample".into()),
            progress,
            downloaded_bytes: 0,
            total_bytes: 100,
            files: Vec::new(),
            private: false,
            trackers: Vec::new(),
            save_path: PathBuf::from("/downloads"),
        }
    }

    #[tokio::test]
    async fn script_replays_then_repeats_the_last_status() {
        let engine = ScriptedTorrentEngine::with_script(vec![status(0.25), status(1.0)]);
        let handle = engine
            .add_torrent(&EngineSource::url("https://example/t"))
            .await
            .expect("add");

        let first = engine.status(&handle).await.expect("status");
        let second = engine.status(&handle).await.expect("status");
        let third = engine.status(&handle).await.expect("status");
        assert!((first.progress - 0.25).abs() < f64::EPSILON);
        assert!((second.progress - 1.0).abs() < f64::EPSILON);
        assert!((third.progress - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn remove_failures_are_bounded() {
        let engine = ScriptedTorrentEngine::default();
        engine.fail_next_removes(1);
        assert!(engine.remove("handle-1", true).await.is_err());
        assert!(engine.remove("handle-1", true).await.is_ok());
        assert_eq!(engine.removed(), vec![("handle-1".to_owned(), true)]);
    }
}
