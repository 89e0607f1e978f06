//! Torrent task repository, including the skip-locked worker claims.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use teledrive_core::{
    DriveError, DriveResult, TorrentSourceKind, TorrentTask, TorrentTaskFile, TorrentTaskStatus,
};
use uuid::Uuid;

const INSERT_TASK: &str = r"
    INSERT INTO torrent_tasks (
        id, source_kind, source_url, name, info_hash, torrent_path,
        engine_handle, target_chat_id, target_parent_id, submitted_by,
        total_size, downloaded_bytes, progress, is_private, trackers, status,
        error, started_at, finished_at, source_cleanup_due_at,
        source_cleanup_done, created_at, updated_at
    )
    VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
        $16, $17, $18, $19, $20, $21, $22, $23
    )
";

const SELECT_TASK: &str = "SELECT * FROM torrent_tasks WHERE id = $1";

const SELECT_TASK_FOR_UPDATE: &str = "SELECT * FROM torrent_tasks WHERE id = $1 FOR UPDATE";

const LIST_TASKS: &str = r"
    SELECT * FROM torrent_tasks ORDER BY created_at DESC, id ASC LIMIT $1 OFFSET $2
";

const COUNT_TASKS: &str = "SELECT COUNT(*) FROM torrent_tasks";

const DELETE_TASK: &str = "DELETE FROM torrent_tasks WHERE id = $1";

const FIND_RESUMABLE: &str = r"
    SELECT * FROM torrent_tasks
    WHERE status IN ('downloading', 'uploading')
    ORDER BY updated_at ASC
    LIMIT 1
";

const CLAIM_NEXT_QUEUED: &str = r"
    UPDATE torrent_tasks
    SET status = 'downloading',
        started_at = COALESCE(started_at, $1),
        updated_at = $1
    WHERE id = (
        SELECT id FROM torrent_tasks
        WHERE status = 'queued'
        ORDER BY created_at ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    RETURNING *
";

const CLAIM_NEXT_DUE_CLEANUP: &str = r"
    UPDATE torrent_tasks
    SET updated_at = $1
    WHERE id = (
        SELECT id FROM torrent_tasks
        WHERE status = 'completed'
          AND NOT source_cleanup_done
          AND source_cleanup_due_at <= $1
        ORDER BY source_cleanup_due_at ASC, created_at ASC
        LIMIT 1
        FOR UPDATE SKIP LOCKED
    )
    RETURNING *
";

const SET_ENGINE_HANDLE: &str = r"
    UPDATE torrent_tasks SET engine_handle = $2, updated_at = $3 WHERE id = $1 RETURNING *
";

const SET_STATUS: &str = r"
    UPDATE torrent_tasks SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *
";

const UPDATE_PROGRESS: &str = r"
    UPDATE torrent_tasks
    SET downloaded_bytes = $2, total_size = $3, progress = $4, updated_at = $5
    WHERE id = $1
";

const SET_METAINFO: &str = r"
    UPDATE torrent_tasks
    SET name = $2, is_private = $3, trackers = $4, updated_at = $5
    WHERE id = $1
";

const FAIL_TASK: &str = r"
    UPDATE torrent_tasks
    SET status = 'error', error = $2, finished_at = $3, updated_at = $3
    WHERE id = $1
    RETURNING *
";

const FINISH_TASK: &str = r"
    UPDATE torrent_tasks
    SET status = 'completed', error = NULL, progress = 1, finished_at = $2, updated_at = $2
    WHERE id = $1
    RETURNING *
";

const SET_CLEANUP_SCHEDULE: &str = r"
    UPDATE torrent_tasks SET source_cleanup_due_at = $2, updated_at = $3 WHERE id = $1
";

const POSTPONE_CLEANUP: &str = r"
    UPDATE torrent_tasks
    SET source_cleanup_due_at = $2, error = $3, updated_at = $4
    WHERE id = $1
";

const MARK_CLEANUP_DONE: &str = r"
    UPDATE torrent_tasks
    SET source_cleanup_done = TRUE, updated_at = $2
    WHERE id = $1
";

const RESET_FOR_RETRY: &str = r"
    UPDATE torrent_tasks
    SET status = 'queued', error = NULL, progress = 0, downloaded_bytes = 0,
        engine_handle = NULL, started_at = NULL, finished_at = NULL,
        source_cleanup_due_at = NULL, source_cleanup_done = FALSE,
        updated_at = $2
    WHERE id = $1
    RETURNING *
";

const DELETE_TASK_FILES: &str = "DELETE FROM torrent_task_files WHERE task_id = $1";

const INSERT_TASK_FILE: &str = r"
    INSERT INTO torrent_task_files (
        id, task_id, file_index, rel_path, file_name, size_bytes, selected,
        uploaded, item_id, error
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
";

const LIST_TASK_FILES: &str = r"
    SELECT * FROM torrent_task_files WHERE task_id = $1 ORDER BY file_index ASC
";

const LIST_PENDING_UPLOAD_FILES: &str = r"
    SELECT * FROM torrent_task_files
    WHERE task_id = $1 AND selected AND NOT uploaded
    ORDER BY file_index ASC
";

const SET_FILE_SELECTION: &str = r"
    UPDATE torrent_task_files
    SET selected = (file_index = ANY($2))
    WHERE task_id = $1
";

const MARK_FILE_UPLOADED: &str = r"
    UPDATE torrent_task_files
    SET uploaded = TRUE, item_id = $3, error = NULL
    WHERE task_id = $1 AND file_index = $2
";

const SET_FILE_ERROR: &str = r"
    UPDATE torrent_task_files SET error = $3 WHERE task_id = $1 AND file_index = $2
";

#[derive(Debug, Clone, FromRow)]
struct TaskRow {
    id: Uuid,
    source_kind: String,
    source_url: Option<String>,
    name: String,
    info_hash: String,
    torrent_path: Option<String>,
    engine_handle: Option<String>,
    target_chat_id: i64,
    target_parent_id: Option<Uuid>,
    submitted_by: String,
    total_size: i64,
    downloaded_bytes: i64,
    progress: f64,
    is_private: bool,
    trackers: Json<Vec<String>>,
    status: String,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    source_cleanup_due_at: Option<DateTime<Utc>>,
    source_cleanup_done: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TaskRow> for TorrentTask {
    fn from(row: TaskRow) -> Self {
        let source_kind = TorrentSourceKind::parse(&row.source_kind).unwrap_or_else(|| {
            tracing::warn!(source_kind = %row.source_kind, task_id = %row.id, "unknown torrent source kind label");
            TorrentSourceKind::Url
        });
        let status = TorrentTaskStatus::parse(&row.status).unwrap_or_else(|| {
            tracing::warn!(status = %row.status, task_id = %row.id, "unknown torrent task status label");
            TorrentTaskStatus::Error
        });
        Self {
            id: row.id,
            source_kind,
            source_url: row.source_url,
            name: row.name,
            info_hash: row.info_hash,
            torrent_path: row.torrent_path,
            engine_handle: row.engine_handle,
            target_chat_id: row.target_chat_id,
            target_parent_id: row.target_parent_id,
            submitted_by: row.submitted_by,
            total_size: row.total_size,
            downloaded_bytes: row.downloaded_bytes,
            progress: row.progress,
            is_private: row.is_private,
            trackers: row.trackers.0,
            status,
            error: row.error,
            started_at: row.started_at,
            finished_at: row.finished_at,
            source_cleanup_due_at: row.source_cleanup_due_at,
            source_cleanup_done: row.source_cleanup_done,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct TaskFileRow {
    id: Uuid,
    task_id: Uuid,
    file_index: i32,
    rel_path: String,
    file_name: String,
    size_bytes: i64,
    selected: bool,
    uploaded: bool,
    item_id: Option<Uuid>,
    error: Option<String>,
}

impl From<TaskFileRow> for TorrentTaskFile {
    fn from(row: TaskFileRow) -> Self {
        Self {
            id: row.id,
            task_id: row.task_id,
            file_index: row.file_index,
            rel_path: row.rel_path,
            file_name: row.file_name,
            size_bytes: row.size_bytes,
            selected: row.selected,
            uploaded: row.uploaded,
            item_id: row.item_id,
            error: row.error,
        }
    }
}

/// Database-backed repository for torrent ingest tasks.
#[derive(Clone)]
pub struct TorrentStore {
    pool: PgPool,
}

impl TorrentStore {
    /// Construct the repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a freshly created task.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Conflict`] on an id collision.
    pub async fn insert(&self, task: &TorrentTask) -> DriveResult<()> {
        sqlx::query(INSERT_TASK)
            .bind(task.id)
            .bind(task.source_kind.as_str())
            .bind(task.source_url.as_deref())
            .bind(&task.name)
            .bind(&task.info_hash)
            .bind(task.torrent_path.as_deref())
            .bind(task.engine_handle.as_deref())
            .bind(task.target_chat_id)
            .bind(task.target_parent_id)
            .bind(&task.submitted_by)
            .bind(task.total_size)
            .bind(task.downloaded_bytes)
            .bind(task.progress)
            .bind(task.is_private)
            .bind(Json(&task.trackers))
            .bind(task.status.as_str())
            .bind(task.error.as_deref())
            .bind(task.started_at)
            .bind(task.finished_at)
            .bind(task.source_cleanup_due_at)
            .bind(task.source_cleanup_done)
            .bind(task.created_at)
            .bind(task.updated_at)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.insert"))?;
        Ok(())
    }

    /// Fetch one task.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when absent.
    pub async fn get(&self, id: Uuid) -> DriveResult<TorrentTask> {
        sqlx::query_as::<_, TaskRow>(SELECT_TASK)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.get"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("torrent task"))
    }

    /// Paged listing, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn list(&self, page: i64, page_size: i64) -> DriveResult<(Vec<TorrentTask>, i64)> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 200);
        let rows = sqlx::query_as::<_, TaskRow>(LIST_TASKS)
            .bind(page_size)
            .bind((page - 1) * page_size)
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.list"))?;
        let total: i64 = sqlx::query_scalar(COUNT_TASKS)
            .fetch_one(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.list.count"))?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    /// Remove one task row; file rows cascade.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn delete(&self, id: Uuid) -> DriveResult<()> {
        let result = sqlx::query(DELETE_TASK)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.delete"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("torrent task"));
        }
        Ok(())
    }

    /// The oldest task already mid-pipeline, if any.
    ///
    /// Used by the claimer on startup and between claims so a task left in
    /// `downloading` or `uploading` by a crash or a selection dispatch is
    /// picked up again.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn find_resumable(&self) -> DriveResult<Option<TorrentTask>> {
        Ok(sqlx::query_as::<_, TaskRow>(FIND_RESUMABLE)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.find_resumable"))?
            .map(Into::into))
    }

    /// Atomically claim the oldest queued task, moving it to `downloading`.
    ///
    /// Concurrent claimers are gated by `FOR UPDATE SKIP LOCKED`: at most one
    /// caller observes any given transition. `started_at` is set only on the
    /// first transition out of `queued`.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the queue is empty.
    pub async fn claim_next_queued(&self, now: DateTime<Utc>) -> DriveResult<TorrentTask> {
        sqlx::query_as::<_, TaskRow>(CLAIM_NEXT_QUEUED)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.claim_next"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("queued torrent task"))
    }

    /// Atomically claim the next task whose source cleanup is due.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when nothing is due.
    pub async fn claim_next_due_cleanup(&self, now: DateTime<Utc>) -> DriveResult<TorrentTask> {
        sqlx::query_as::<_, TaskRow>(CLAIM_NEXT_DUE_CLEANUP)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.claim_cleanup"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("due torrent cleanup task"))
    }

    /// Record the engine's handle for a task.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn set_engine_handle(
        &self,
        id: Uuid,
        handle: &str,
        now: DateTime<Utc>,
    ) -> DriveResult<TorrentTask> {
        sqlx::query_as::<_, TaskRow>(SET_ENGINE_HANDLE)
            .bind(id)
            .bind(handle)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.set_handle"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("torrent task"))
    }

    /// Move a task to another state without touching timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn set_status(
        &self,
        id: Uuid,
        status: TorrentTaskStatus,
        now: DateTime<Utc>,
    ) -> DriveResult<TorrentTask> {
        sqlx::query_as::<_, TaskRow>(SET_STATUS)
            .bind(id)
            .bind(status.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.set_status"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("torrent task"))
    }

    /// Update the monitoring counters from an engine poll.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn update_progress(
        &self,
        id: Uuid,
        downloaded_bytes: i64,
        total_size: i64,
        progress: f64,
        now: DateTime<Utc>,
    ) -> DriveResult<()> {
        let result = sqlx::query(UPDATE_PROGRESS)
            .bind(id)
            .bind(downloaded_bytes)
            .bind(total_size)
            .bind(progress.clamp(0.0, 1.0))
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.update_progress"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("torrent task"));
        }
        Ok(())
    }

    /// Persist the metainfo attributes once the engine resolves them.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn set_metainfo(
        &self,
        id: Uuid,
        name: &str,
        is_private: bool,
        trackers: &[String],
        now: DateTime<Utc>,
    ) -> DriveResult<()> {
        let result = sqlx::query(SET_METAINFO)
            .bind(id)
            .bind(name)
            .bind(is_private)
            .bind(Json(trackers))
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.set_metainfo"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("torrent task"));
        }
        Ok(())
    }

    /// Record a terminal failure.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn fail(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> DriveResult<TorrentTask> {
        sqlx::query_as::<_, TaskRow>(FAIL_TASK)
            .bind(id)
            .bind(error)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.fail"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("torrent task"))
    }

    /// Mark a task completed.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn finish(&self, id: Uuid, now: DateTime<Utc>) -> DriveResult<TorrentTask> {
        sqlx::query_as::<_, TaskRow>(FINISH_TASK)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.finish"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("torrent task"))
    }

    /// Schedule the deferred source cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn set_cleanup_schedule(
        &self,
        id: Uuid,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DriveResult<()> {
        let result = sqlx::query(SET_CLEANUP_SCHEDULE)
            .bind(id)
            .bind(due_at)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.schedule_cleanup"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("torrent task"));
        }
        Ok(())
    }

    /// Push the cleanup due time back after a failed attempt, keeping the
    /// failure visible on the task row.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn postpone_cleanup(
        &self,
        id: Uuid,
        next_due_at: DateTime<Utc>,
        error: &str,
        now: DateTime<Utc>,
    ) -> DriveResult<()> {
        let result = sqlx::query(POSTPONE_CLEANUP)
            .bind(id)
            .bind(next_due_at)
            .bind(error)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.postpone_cleanup"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("torrent task"));
        }
        Ok(())
    }

    /// Record that the engine's local copy was removed.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the task is absent.
    pub async fn mark_cleanup_done(&self, id: Uuid, now: DateTime<Utc>) -> DriveResult<()> {
        let result = sqlx::query(MARK_CLEANUP_DONE)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.mark_cleanup_done"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("torrent task"));
        }
        Ok(())
    }

    /// Rewind a terminal task back to `queued`, clearing progress, the
    /// engine handle, timestamps, and all file rows.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when absent and
    /// [`DriveError::BadInput`] when the task is not in a terminal state.
    pub async fn reset_for_retry(&self, id: Uuid, now: DateTime<Utc>) -> DriveResult<TorrentTask> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(super::error::map_sqlx_err("torrents.retry.begin"))?;
        let current: TorrentTask = sqlx::query_as::<_, TaskRow>(SELECT_TASK_FOR_UPDATE)
            .bind(id)
            .fetch_optional(tx.as_mut())
            .await
            .map_err(super::error::map_sqlx_err("torrents.retry.lock"))?
            .ok_or(DriveError::not_found("torrent task"))?
            .into();
        if !current.status.is_retryable() {
            return Err(DriveError::bad_input(format!(
                "torrent task in state {} cannot be retried",
                current.status.as_str()
            )));
        }
        let task: TorrentTask = sqlx::query_as::<_, TaskRow>(RESET_FOR_RETRY)
            .bind(id)
            .bind(now)
            .fetch_one(tx.as_mut())
            .await
            .map_err(super::error::map_sqlx_err("torrents.retry.reset"))?
            .into();
        sqlx::query(DELETE_TASK_FILES)
            .bind(id)
            .execute(tx.as_mut())
            .await
            .map_err(super::error::map_sqlx_err("torrents.retry.clear_files"))?;
        tx.commit()
            .await
            .map_err(super::error::map_sqlx_err("torrents.retry.commit"))?;
        Ok(task)
    }

    /// Replace the task's file rows with the engine-reported list.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn replace_files(
        &self,
        task_id: Uuid,
        files: &[TorrentTaskFile],
    ) -> DriveResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(super::error::map_sqlx_err("torrents.files.begin"))?;
        sqlx::query(DELETE_TASK_FILES)
            .bind(task_id)
            .execute(tx.as_mut())
            .await
            .map_err(super::error::map_sqlx_err("torrents.files.clear"))?;
        for file in files {
            sqlx::query(INSERT_TASK_FILE)
                .bind(file.id)
                .bind(task_id)
                .bind(file.file_index)
                .bind(&file.rel_path)
                .bind(&file.file_name)
                .bind(file.size_bytes)
                .bind(file.selected)
                .bind(file.uploaded)
                .bind(file.item_id)
                .bind(file.error.as_deref())
                .execute(tx.as_mut())
                .await
                .map_err(super::error::map_sqlx_err("torrents.files.insert"))?;
        }
        tx.commit()
            .await
            .map_err(super::error::map_sqlx_err("torrents.files.commit"))?;
        Ok(())
    }

    /// All file rows of one task, ordered by index.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn files_for(&self, task_id: Uuid) -> DriveResult<Vec<TorrentTaskFile>> {
        let rows = sqlx::query_as::<_, TaskFileRow>(LIST_TASK_FILES)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.files_for"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Selected file rows that still need a blob-tier upload.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn list_pending_upload_files(
        &self,
        task_id: Uuid,
    ) -> DriveResult<Vec<TorrentTaskFile>> {
        let rows = sqlx::query_as::<_, TaskFileRow>(LIST_PENDING_UPLOAD_FILES)
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.pending_files"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Mark exactly the given indexes as selected, clearing the rest.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn set_file_selection(
        &self,
        task_id: Uuid,
        file_indexes: &[i32],
    ) -> DriveResult<u64> {
        let result = sqlx::query(SET_FILE_SELECTION)
            .bind(task_id)
            .bind(file_indexes)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.set_selection"))?;
        Ok(result.rows_affected())
    }

    /// Record a successful per-file upload and its resulting item.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the file row is absent.
    pub async fn mark_file_uploaded(
        &self,
        task_id: Uuid,
        file_index: i32,
        item_id: Uuid,
    ) -> DriveResult<()> {
        let result = sqlx::query(MARK_FILE_UPLOADED)
            .bind(task_id)
            .bind(file_index)
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.mark_uploaded"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("torrent task file"));
        }
        Ok(())
    }

    /// Record a per-file failure without failing the task.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the file row is absent.
    pub async fn set_file_error(
        &self,
        task_id: Uuid,
        file_index: i32,
        error: &str,
    ) -> DriveResult<()> {
        let result = sqlx::query(SET_FILE_ERROR)
            .bind(task_id)
            .bind(file_index)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("torrents.set_file_error"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("torrent task file"));
        }
        Ok(())
    }
}
