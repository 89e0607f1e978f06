//! The claimer worker driving torrent tasks through their state machine.
//!
//! One worker owns the pipeline: it claims the oldest queued task with a
//! skip-locked update, hands the source to the engine, polls for progress,
//! persists the file list once metainfo resolves, parks tasks that lack a
//! selection, uploads completed files, and finishes the task with a
//! source-cleanup schedule.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use teledrive_core::{
    CleanupPolicy, DriveError, DriveResult, EngineSource, EngineStatus, RuntimeSettings,
    TorrentEngine, TorrentTask, TorrentTaskFile, TorrentTaskStatus,
};
use teledrive_data::{SettingsStore, TorrentStore};
use teledrive_telemetry::Metrics;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::uploader::TaskFileUploader;

const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Single-owner worker for the torrent ingest pipeline.
pub struct TorrentClaimWorker {
    torrents: TorrentStore,
    settings: SettingsStore,
    defaults: RuntimeSettings,
    engine: Arc<dyn TorrentEngine>,
    uploader: TaskFileUploader,
    metrics: Metrics,
    idle_interval: Duration,
    poll_interval: Duration,
}

impl TorrentClaimWorker {
    /// Construct the worker with the default cadences.
    #[must_use]
    pub fn new(
        torrents: TorrentStore,
        settings: SettingsStore,
        defaults: RuntimeSettings,
        engine: Arc<dyn TorrentEngine>,
        uploader: TaskFileUploader,
        metrics: Metrics,
    ) -> Self {
        Self {
            torrents,
            settings,
            defaults,
            engine,
            uploader,
            metrics,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the claim and poll cadences (tests use short ones).
    #[must_use]
    pub const fn with_intervals(mut self, idle: Duration, poll: Duration) -> Self {
        self.idle_interval = idle;
        self.poll_interval = poll;
        self
    }

    /// Spawn the claim loop; it exits when `shutdown` flips to `true`.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }
                self.run_once(&shutdown).await;
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    () = tokio::time::sleep(self.idle_interval) => {}
                }
            }
            info!("torrent claim worker stopped");
        })
    }

    /// Resume a mid-pipeline task or claim the next queued one, then drive
    /// it as far as it can go without user input.
    pub async fn run_once(&self, shutdown: &watch::Receiver<bool>) {
        let task = match self.next_task().await {
            Ok(Some(task)) => task,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "failed to look up the next torrent task");
                return;
            }
        };
        self.drive(task, shutdown).await;
    }

    async fn next_task(&self) -> DriveResult<Option<TorrentTask>> {
        if let Some(task) = self.torrents.find_resumable().await? {
            return Ok(Some(task));
        }
        match self.torrents.claim_next_queued(Utc::now()).await {
            Ok(task) => {
                info!(task_id = %task.id, "torrent task claimed");
                Ok(Some(task))
            }
            Err(DriveError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn drive(&self, mut task: TorrentTask, shutdown: &watch::Receiver<bool>) {
        let handle = match task.engine_handle.clone() {
            Some(handle) => handle,
            None => match self.admit(&task).await {
                Some(handle) => handle,
                None => return,
            },
        };

        loop {
            if *shutdown.borrow() {
                return;
            }
            let status = match self.engine.status(&handle).await {
                Ok(status) => status,
                Err(err) if err.is_transient() => {
                    warn!(error = %err, task_id = %task.id, "engine status poll failed; retrying");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
                Err(err) => {
                    self.fail_task(task.id, &format!("engine status failed: {err}")).await;
                    return;
                }
            };

            if let Err(err) = self.record_progress(&task, &status).await {
                warn!(error = %err, task_id = %task.id, "failed to record torrent progress");
            }

            let files = match self.sync_files(&task, &status).await {
                Ok(files) => files,
                Err(err) => {
                    warn!(error = %err, task_id = %task.id, "failed to persist torrent file list");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };
            if files.is_empty() {
                // Metainfo not resolved yet.
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            if !files.iter().any(|file| file.selected) {
                match self
                    .torrents
                    .set_status(task.id, TorrentTaskStatus::AwaitingSelection, Utc::now())
                    .await
                {
                    Ok(_) => info!(task_id = %task.id, "torrent task parked awaiting selection"),
                    Err(err) => {
                        warn!(error = %err, task_id = %task.id, "failed to park torrent task");
                    }
                }
                return;
            }

            let pending = match self.torrents.list_pending_upload_files(task.id).await {
                Ok(pending) => pending,
                Err(err) => {
                    warn!(error = %err, task_id = %task.id, "failed to list pending torrent files");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };
            if pending.is_empty() {
                self.finish_task(&task).await;
                return;
            }

            let ready: Vec<TorrentTaskFile> = pending
                .into_iter()
                .filter(|file| is_locally_complete(file, &status))
                .collect();
            if ready.is_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            if task.status != TorrentTaskStatus::Uploading {
                match self
                    .torrents
                    .set_status(task.id, TorrentTaskStatus::Uploading, Utc::now())
                    .await
                {
                    Ok(updated) => task = updated,
                    Err(err) => {
                        warn!(error = %err, task_id = %task.id, "failed to mark torrent uploading");
                    }
                }
            }

            let succeeded = self.upload_round(&task, &status, ready).await;
            if succeeded == 0 {
                // Every ready file failed; the per-file errors are recorded,
                // and retrying in a tight loop will not change the outcome.
                self.fail_task(task.id, "all pending file uploads failed").await;
                return;
            }
        }
    }

    /// Hand the task's source to the engine and record the handle.
    async fn admit(&self, task: &TorrentTask) -> Option<String> {
        let source = match (&task.source_url, &task.torrent_path) {
            (Some(url), _) => EngineSource::url(url.clone()),
            (None, Some(path)) => EngineSource::file(path.clone()),
            (None, None) => {
                self.fail_task(task.id, "task has neither a source url nor a torrent file")
                    .await;
                return None;
            }
        };
        match self.engine.add_torrent(&source).await {
            Ok(handle) => {
                match self
                    .torrents
                    .set_engine_handle(task.id, &handle, Utc::now())
                    .await
                {
                    Ok(_) => {
                        info!(task_id = %task.id, handle = %handle, "torrent admitted to engine");
                        Some(handle)
                    }
                    Err(err) => {
                        warn!(error = %err, task_id = %task.id, "failed to record engine handle");
                        None
                    }
                }
            }
            Err(err) if err.is_transient() => {
                warn!(error = %err, task_id = %task.id, "engine busy; task returned to queue");
                if let Err(err) = self
                    .torrents
                    .set_status(task.id, TorrentTaskStatus::Queued, Utc::now())
                    .await
                {
                    warn!(error = %err, task_id = %task.id, "failed to requeue torrent task");
                }
                None
            }
            Err(err) => {
                self.fail_task(task.id, &format!("engine rejected the torrent: {err}"))
                    .await;
                None
            }
        }
    }

    async fn record_progress(&self, task: &TorrentTask, status: &EngineStatus) -> DriveResult<()> {
        let total = if status.total_bytes > 0 {
            status.total_bytes
        } else {
            task.total_size
        };
        self.torrents
            .update_progress(
                task.id,
                status.downloaded_bytes,
                total,
                status.progress,
                Utc::now(),
            )
            .await
    }

    /// Persist the engine-reported file list once, preserving selection and
    /// upload flags already present (file submissions carry both from the
    /// parsed metainfo).
    async fn sync_files(
        &self,
        task: &TorrentTask,
        status: &EngineStatus,
    ) -> DriveResult<Vec<TorrentTaskFile>> {
        let existing = self.torrents.files_for(task.id).await?;
        if !status.metainfo_ready() {
            return Ok(existing);
        }
        if existing.len() == status.files.len() {
            return Ok(existing);
        }

        let merged: Vec<TorrentTaskFile> = status
            .files
            .iter()
            .map(|engine_file| {
                existing
                    .iter()
                    .find(|file| file.file_index == engine_file.index)
                    .cloned()
                    .map_or_else(
                        || TorrentTaskFile {
                            id: Uuid::new_v4(),
                            task_id: task.id,
                            file_index: engine_file.index,
                            rel_path: engine_file.rel_path.clone(),
                            file_name: file_name_of(&engine_file.rel_path),
                            size_bytes: engine_file.size_bytes,
                            selected: false,
                            uploaded: false,
                            item_id: None,
                            error: None,
                        },
                        |mut file| {
                            file.rel_path.clone_from(&engine_file.rel_path);
                            file.size_bytes = engine_file.size_bytes;
                            file
                        },
                    )
            })
            .collect();
        self.torrents.replace_files(task.id, &merged).await?;

        let name = status.name.clone().unwrap_or_else(|| task.name.clone());
        self.torrents
            .set_metainfo(task.id, &name, status.private, &status.trackers, Utc::now())
            .await?;
        debug!(task_id = %task.id, file_count = merged.len(), "torrent file list persisted");
        Ok(merged)
    }

    /// Upload every ready file, returning how many succeeded. Failures are
    /// recorded per file row and never abort the round.
    async fn upload_round(
        &self,
        task: &TorrentTask,
        status: &EngineStatus,
        ready: Vec<TorrentTaskFile>,
    ) -> usize {
        let mut succeeded = 0;
        let mut join_set = tokio::task::JoinSet::new();
        for file in ready {
            let uploader = self.uploader.clone();
            let task = task.clone();
            let save_path = status.save_path.clone();
            join_set
                .spawn(async move { uploader.upload_file(&task, &file, &save_path).await });
        }
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(_)) => succeeded += 1,
                Ok(Err(_)) => {}
                Err(err) => warn!(error = %err, task_id = %task.id, "file upload task panicked"),
            }
        }
        succeeded
    }

    async fn finish_task(&self, task: &TorrentTask) {
        let now = Utc::now();
        match self.torrents.finish(task.id, now).await {
            Ok(_) => {
                self.metrics.record_torrent_finished("completed");
                info!(task_id = %task.id, "torrent task completed");
            }
            Err(err) => {
                warn!(error = %err, task_id = %task.id, "failed to finish torrent task");
                return;
            }
        }
        match self.cleanup_due_at(now).await {
            Ok(due_at) => {
                if let Err(err) = self.torrents.set_cleanup_schedule(task.id, due_at, now).await {
                    warn!(error = %err, task_id = %task.id, "failed to schedule source cleanup");
                }
            }
            Err(err) => {
                warn!(error = %err, task_id = %task.id, "failed to read cleanup policy");
            }
        }
    }

    async fn cleanup_due_at(&self, now: DateTime<Utc>) -> DriveResult<DateTime<Utc>> {
        let settings = self.settings.get_or_init(&self.defaults).await?;
        let delay_minutes = match settings.torrent_cleanup_policy {
            CleanupPolicy::Immediate => 0,
            CleanupPolicy::Fixed => i64::from(settings.torrent_cleanup_fixed_minutes),
            CleanupPolicy::Random => {
                let low = settings.torrent_cleanup_min_minutes;
                let high = settings.torrent_cleanup_max_minutes.max(low);
                i64::from(rand::rng().random_range(low..=high))
            }
        };
        Ok(now + ChronoDuration::minutes(delay_minutes))
    }

    async fn fail_task(&self, task_id: Uuid, error: &str) {
        match self.torrents.fail(task_id, error, Utc::now()).await {
            Ok(_) => {
                self.metrics.record_torrent_finished("error");
                warn!(task_id = %task_id, error, "torrent task failed");
            }
            Err(err) => {
                warn!(error = %err, task_id = %task_id, "failed to record torrent task failure");
            }
        }
    }
}

fn is_locally_complete(file: &TorrentTaskFile, status: &EngineStatus) -> bool {
    status
        .files
        .iter()
        .find(|engine_file| engine_file.index == file.file_index)
        .is_some_and(teledrive_core::EngineFile::is_complete)
}

fn file_name_of(rel_path: &str) -> String {
    rel_path
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(rel_path)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use teledrive_core::EngineFile;

    fn engine_status(files: Vec<EngineFile>) -> EngineStatus {
        EngineStatus {
            name: Some("sample".into()),
            progress: 0.5,
            downloaded_bytes: 50,
            total_bytes: 100,
            files,
            private: false,
            trackers: vec!["tracker.example".into()],
            save_path: PathBuf::from("/downloads"),
        }
    }

    fn task_file(index: i32) -> TorrentTaskFile {
        TorrentTaskFile {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            file_index: index,
            rel_path: format!("payload/file-{index}.bin"),
            file_name: format!("file-{index}.bin"),
            size_bytes: 50,
            selected: true,
            uploaded: false,
            item_id: None,
            error: None,
        }
    }

    #[test]
    fn local_completion_follows_engine_bytes() {
        let status = engine_status(vec![
            EngineFile {
                index: 0,
                rel_path: "payload/file-0.bin".into(),
                size_bytes: 50,
                bytes_done: 50,
            },
            EngineFile {
                index: 1,
                rel_path: "payload/file-1.bin".into(),
                size_bytes: 50,
                bytes_done: 10,
            },
        ]);
        assert!(is_locally_complete(&task_file(0), &status));
        assert!(!is_locally_complete(&task_file(1), &status));
        assert!(!is_locally_complete(&task_file(2), &status));
    }

    #[test]
    fn file_names_strip_directories() {
        assert_eq!(file_name_of("season/episode.mkv"), "episode.mkv");
        assert_eq!(file_name_of("flat.bin"), "flat.bin");
        assert_eq!(file_name_of("trailing/"), "trailing/");
    }
}
