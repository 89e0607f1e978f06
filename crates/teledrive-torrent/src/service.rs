//! Torrent task submission and operator controls.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lava_torrent::torrent::v1::Torrent;
use teledrive_core::{
    DriveError, DriveResult, TorrentEngine, TorrentSourceKind, TorrentTask, TorrentTaskFile,
    TorrentTaskStatus,
};
use teledrive_data::TorrentStore;
use tracing::{info, warn};
use uuid::Uuid;

/// A task together with its per-file rows.
#[derive(Debug, Clone)]
pub struct TaskWithFiles {
    /// The task row.
    pub task: TorrentTask,
    /// File rows ordered by index; empty until metainfo is resolved.
    pub files: Vec<TorrentTaskFile>,
}

/// Submission and control surface for torrent ingest.
#[derive(Clone)]
pub struct TorrentService {
    torrents: TorrentStore,
    engine: Arc<dyn TorrentEngine>,
    torrent_dir: PathBuf,
}

impl TorrentService {
    /// Construct the service; `torrent_dir` holds persisted `.torrent`
    /// files for uploaded submissions.
    #[must_use]
    pub fn new(
        torrents: TorrentStore,
        engine: Arc<dyn TorrentEngine>,
        torrent_dir: PathBuf,
    ) -> Self {
        Self {
            torrents,
            engine,
            torrent_dir,
        }
    }

    /// Submit a torrent by URL. The engine resolves the metainfo, so the
    /// info hash and file list stay unknown until the task is claimed.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] for an empty URL.
    pub async fn create_from_url(
        &self,
        url: &str,
        target_chat_id: i64,
        target_parent_id: Option<Uuid>,
        submitted_by: &str,
        now: DateTime<Utc>,
    ) -> DriveResult<TorrentTask> {
        let url = url.trim();
        if url.is_empty() {
            return Err(DriveError::bad_input("torrent url must not be empty"));
        }
        let name = url
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .unwrap_or(url)
            .to_owned();
        let task = new_task(
            TorrentSourceKind::Url,
            Some(url.to_owned()),
            name,
            String::new(),
            None,
            target_chat_id,
            target_parent_id,
            submitted_by,
            0,
            false,
            Vec::new(),
            now,
        );
        self.torrents.insert(&task).await?;
        info!(task_id = %task.id, url, "torrent task submitted from url");
        Ok(task)
    }

    /// Submit an uploaded `.torrent` file.
    ///
    /// The metainfo is parsed immediately: the info hash, name, size,
    /// privacy flag, trackers, and file rows are known before the engine
    /// ever sees the task. `selection` pre-selects file indexes; without it
    /// the task parks at `awaiting_selection` once it is claimed.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] when the payload is not a valid
    /// torrent and [`DriveError::Transient`] when persisting the file fails.
    pub async fn create_from_file(
        &self,
        bytes: &[u8],
        target_chat_id: i64,
        target_parent_id: Option<Uuid>,
        submitted_by: &str,
        selection: Option<&[i32]>,
        now: DateTime<Utc>,
    ) -> DriveResult<TaskWithFiles> {
        let metainfo = Torrent::read_from_bytes(bytes)
            .map_err(|err| DriveError::bad_input(format!("invalid torrent file: {err}")))?;
        let info_hash = metainfo.info_hash().to_lowercase();
        let torrent_path = self.torrent_dir.join(format!("{info_hash}.torrent"));
        tokio::fs::create_dir_all(&self.torrent_dir)
            .await
            .map_err(|err| DriveError::transient("torrent.persist_dir", err))?;
        tokio::fs::write(&torrent_path, bytes)
            .await
            .map_err(|err| DriveError::transient("torrent.persist_file", err))?;

        let trackers = tracker_hosts(&metainfo);
        let task = new_task(
            TorrentSourceKind::File,
            None,
            metainfo.name.clone(),
            info_hash,
            Some(torrent_path.to_string_lossy().into_owned()),
            target_chat_id,
            target_parent_id,
            submitted_by,
            metainfo.length,
            metainfo.is_private(),
            trackers,
            now,
        );
        self.torrents.insert(&task).await?;

        let files = metainfo_files(&metainfo, task.id, selection);
        self.torrents.replace_files(task.id, &files).await?;
        info!(
            task_id = %task.id,
            info_hash = %task.info_hash,
            file_count = files.len(),
            "torrent task submitted from file"
        );
        Ok(TaskWithFiles { task, files })
    }

    /// Select files on a parked task and return it to the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] when the task is not awaiting a
    /// selection or no index was given.
    pub async fn dispatch(
        &self,
        task_id: Uuid,
        file_indexes: &[i32],
        now: DateTime<Utc>,
    ) -> DriveResult<TaskWithFiles> {
        if file_indexes.is_empty() {
            return Err(DriveError::bad_input("at least one file must be selected"));
        }
        let task = self.torrents.get(task_id).await?;
        if task.status != TorrentTaskStatus::AwaitingSelection {
            return Err(DriveError::bad_input(format!(
                "torrent task in state {} does not accept a selection",
                task.status.as_str()
            )));
        }
        self.torrents.set_file_selection(task_id, file_indexes).await?;
        let task = self
            .torrents
            .set_status(task_id, TorrentTaskStatus::Downloading, now)
            .await?;
        let files = self.torrents.files_for(task_id).await?;
        info!(task_id = %task_id, selected = file_indexes.len(), "torrent selection dispatched");
        Ok(TaskWithFiles { task, files })
    }

    /// Rewind a terminal task to `queued` for another run.
    ///
    /// # Errors
    ///
    /// See [`TorrentStore::reset_for_retry`].
    pub async fn retry(&self, task_id: Uuid, now: DateTime<Utc>) -> DriveResult<TorrentTask> {
        let task = self.torrents.reset_for_retry(task_id, now).await?;
        info!(task_id = %task_id, "torrent task reset for retry");
        Ok(task)
    }

    /// Remove a task; the engine's copy goes with it, deleting local data
    /// when the task never finished.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn delete(&self, task_id: Uuid) -> DriveResult<()> {
        let task = self.torrents.get(task_id).await?;
        if let Some(handle) = task.engine_handle.as_deref() {
            let delete_local = task.status != TorrentTaskStatus::Completed;
            if let Err(err) = self.engine.remove(handle, delete_local).await {
                warn!(error = %err, task_id = %task_id, "engine remove failed during task delete");
            }
        }
        self.torrents.delete(task_id).await?;
        info!(task_id = %task_id, "torrent task deleted");
        Ok(())
    }

    /// Fetch one task with its file rows.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn get(&self, task_id: Uuid) -> DriveResult<TaskWithFiles> {
        let task = self.torrents.get(task_id).await?;
        let files = self.torrents.files_for(task_id).await?;
        Ok(TaskWithFiles { task, files })
    }

    /// Paged listing, newest first, with file rows attached.
    ///
    /// # Errors
    ///
    /// Returns the underlying repository error.
    pub async fn list(&self, page: i64, page_size: i64) -> DriveResult<(Vec<TaskWithFiles>, i64)> {
        let (tasks, total) = self.torrents.list(page, page_size).await?;
        let mut detailed = Vec::with_capacity(tasks.len());
        for task in tasks {
            let files = self.torrents.files_for(task.id).await?;
            detailed.push(TaskWithFiles { task, files });
        }
        Ok((detailed, total))
    }
}

#[allow(clippy::too_many_arguments)]
fn new_task(
    source_kind: TorrentSourceKind,
    source_url: Option<String>,
    name: String,
    info_hash: String,
    torrent_path: Option<String>,
    target_chat_id: i64,
    target_parent_id: Option<Uuid>,
    submitted_by: &str,
    total_size: i64,
    is_private: bool,
    trackers: Vec<String>,
    now: DateTime<Utc>,
) -> TorrentTask {
    TorrentTask {
        id: Uuid::new_v4(),
        source_kind,
        source_url,
        name,
        info_hash,
        torrent_path,
        engine_handle: None,
        target_chat_id,
        target_parent_id,
        submitted_by: submitted_by.to_owned(),
        total_size,
        downloaded_bytes: 0,
        progress: 0.0,
        is_private,
        trackers,
        status: TorrentTaskStatus::Queued,
        error: None,
        started_at: None,
        finished_at: None,
        source_cleanup_due_at: None,
        source_cleanup_done: false,
        created_at: now,
        updated_at: now,
    }
}

fn tracker_hosts(metainfo: &Torrent) -> Vec<String> {
    let mut hosts = Vec::new();
    let mut push = |announce: &str| {
        let host = announce
            .split("://")
            .nth(1)
            .unwrap_or(announce)
            .split(['/', ':'])
            .next()
            .unwrap_or(announce)
            .to_owned();
        if !host.is_empty() && !hosts.contains(&host) {
            hosts.push(host);
        }
    };
    if let Some(announce) = metainfo.announce.as_deref() {
        push(announce);
    }
    if let Some(tiers) = metainfo.announce_list.as_ref() {
        for tier in tiers {
            for announce in tier {
                push(announce.as_str());
            }
        }
    }
    hosts
}

fn metainfo_files(
    metainfo: &Torrent,
    task_id: Uuid,
    selection: Option<&[i32]>,
) -> Vec<TorrentTaskFile> {
    let is_selected =
        |index: i32| selection.is_some_and(|indexes| indexes.contains(&index));
    match metainfo.files.as_ref() {
        // Multi-file torrent: paths are relative to the root directory name.
        Some(files) => files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let index = i32::try_from(index).unwrap_or(i32::MAX);
                let rel_path = PathBuf::from(&metainfo.name)
                    .join(&file.path)
                    .to_string_lossy()
                    .into_owned();
                let file_name = file
                    .path
                    .file_name()
                    .map_or_else(|| metainfo.name.clone(), |name| {
                        name.to_string_lossy().into_owned()
                    });
                TorrentTaskFile {
                    id: Uuid::new_v4(),
                    task_id,
                    file_index: index,
                    rel_path,
                    file_name,
                    size_bytes: file.length,
                    selected: is_selected(index),
                    uploaded: false,
                    item_id: None,
                    error: None,
                }
            })
            .collect(),
        None => vec![TorrentTaskFile {
            id: Uuid::new_v4(),
            task_id,
            file_index: 0,
            rel_path: metainfo.name.clone(),
            file_name: metainfo.name.clone(),
            size_bytes: metainfo.length,
            selected: is_selected(0),
            uploaded: false,
            item_id: None,
            error: None,
        }],
    }
}
