//! Retry ledger for blob-tier deletions that have not succeeded yet.
//!
//! Rows are upserted on failure and only ever marked resolved, never
//! deleted; the ledger doubles as a post-mortem record.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use teledrive_core::{ChunkRef, DeleteFailure, DriveError, DriveResult};
use uuid::Uuid;

const UPSERT_FAILURE: &str = r"
    INSERT INTO telegram_delete_failures (
        id, tg_chat_id, tg_message_id, item_id, item_path, error, retry_count,
        resolved, last_retry_at, resolved_at, created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, 1, FALSE, $7, NULL, $7, $7)
    ON CONFLICT (tg_chat_id, tg_message_id) DO UPDATE
    SET error = EXCLUDED.error,
        retry_count = telegram_delete_failures.retry_count + 1,
        resolved = FALSE,
        last_retry_at = EXCLUDED.last_retry_at,
        updated_at = EXCLUDED.updated_at
    RETURNING *
";

const ENQUEUE_PENDING: &str = r"
    INSERT INTO telegram_delete_failures (
        id, tg_chat_id, tg_message_id, item_id, item_path, error, retry_count,
        resolved, last_retry_at, resolved_at, created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, 0, FALSE, NULL, NULL, $7, $7)
    ON CONFLICT (tg_chat_id, tg_message_id) DO UPDATE
    SET resolved = FALSE, updated_at = EXCLUDED.updated_at
    RETURNING *
";

const LIST_UNRESOLVED: &str = r"
    SELECT * FROM telegram_delete_failures
    WHERE NOT resolved
    ORDER BY created_at ASC
    LIMIT $1
";

const MARK_RESOLVED: &str = r"
    UPDATE telegram_delete_failures
    SET resolved = TRUE, resolved_at = $2, updated_at = $2
    WHERE id = $1
";

const RECORD_RETRY_FAILURE: &str = r"
    UPDATE telegram_delete_failures
    SET retry_count = retry_count + 1, error = $2, last_retry_at = $3, updated_at = $3
    WHERE id = $1
";

const COUNT_UNRESOLVED: &str = r"
    SELECT COUNT(*) FROM telegram_delete_failures WHERE NOT resolved
";

#[derive(Debug, Clone, FromRow)]
struct FailureRow {
    id: Uuid,
    tg_chat_id: i64,
    tg_message_id: i64,
    item_id: Option<Uuid>,
    item_path: Option<String>,
    error: String,
    retry_count: i32,
    resolved: bool,
    last_retry_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FailureRow> for DeleteFailure {
    fn from(row: FailureRow) -> Self {
        Self {
            id: row.id,
            tg_chat_id: row.tg_chat_id,
            tg_message_id: row.tg_message_id,
            item_id: row.item_id,
            item_path: row.item_path,
            error: row.error,
            retry_count: row.retry_count,
            resolved: row.resolved,
            last_retry_at: row.last_retry_at,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database-backed repository for the delete retry ledger.
#[derive(Clone)]
pub struct DeleteFailureStore {
    pool: PgPool,
}

impl DeleteFailureStore {
    /// Construct the repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a failed delete attempt, bumping `retry_count` on re-failure.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn record_failed_attempt(
        &self,
        chunk: ChunkRef,
        item_id: Option<Uuid>,
        item_path: Option<&str>,
        error: &str,
        now: DateTime<Utc>,
    ) -> DriveResult<DeleteFailure> {
        let row = sqlx::query_as::<_, FailureRow>(UPSERT_FAILURE)
            .bind(Uuid::new_v4())
            .bind(chunk.chat_id)
            .bind(chunk.message_id)
            .bind(item_id)
            .bind(item_path)
            .bind(error)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("cleanup.record_failure"))?;
        Ok(row.into())
    }

    /// Enqueue a delete that has not been attempted yet (orphan blobs,
    /// expired sessions).
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn enqueue_pending(
        &self,
        chunk: ChunkRef,
        item_id: Option<Uuid>,
        item_path: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DriveResult<DeleteFailure> {
        let row = sqlx::query_as::<_, FailureRow>(ENQUEUE_PENDING)
            .bind(Uuid::new_v4())
            .bind(chunk.chat_id)
            .bind(chunk.message_id)
            .bind(item_id)
            .bind(item_path)
            .bind(reason)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("cleanup.enqueue"))?;
        Ok(row.into())
    }

    /// Oldest unresolved entries, bounded for one worker batch.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn list_unresolved(&self, limit: i64) -> DriveResult<Vec<DeleteFailure>> {
        let rows = sqlx::query_as::<_, FailureRow>(LIST_UNRESOLVED)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("cleanup.list_unresolved"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Mark one entry resolved.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the entry is absent.
    pub async fn mark_resolved(&self, id: Uuid, now: DateTime<Utc>) -> DriveResult<()> {
        let result = sqlx::query(MARK_RESOLVED)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("cleanup.mark_resolved"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("delete failure"));
        }
        Ok(())
    }

    /// Record another failed retry for an existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the entry is absent.
    pub async fn record_retry_failure(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> DriveResult<()> {
        let result = sqlx::query(RECORD_RETRY_FAILURE)
            .bind(id)
            .bind(error)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("cleanup.record_retry"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("delete failure"));
        }
        Ok(())
    }

    /// Number of unresolved entries, exposed as a gauge.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn count_unresolved(&self) -> DriveResult<i64> {
        sqlx::query_scalar(COUNT_UNRESOLVED)
            .fetch_one(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("cleanup.count_unresolved"))
    }
}
