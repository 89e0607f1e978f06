//! Transfer history ledger repository.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use teledrive_core::{DriveResult, TransferDirection, TransferRecord, TransferStatus};
use uuid::Uuid;

const UPSERT_RECORD: &str = r"
    INSERT INTO transfer_history (
        id, direction, source_task_id, item_name, size_bytes, status, error,
        faststart_applied, preview_attached, started_at, finished_at,
        created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (direction, source_task_id) DO UPDATE
    SET item_name = EXCLUDED.item_name,
        size_bytes = EXCLUDED.size_bytes,
        status = EXCLUDED.status,
        error = EXCLUDED.error,
        faststart_applied = EXCLUDED.faststart_applied,
        preview_attached = EXCLUDED.preview_attached,
        started_at = EXCLUDED.started_at,
        finished_at = EXCLUDED.finished_at,
        updated_at = EXCLUDED.updated_at
    RETURNING *
";

const LIST_RECORDS: &str = r"
    SELECT * FROM transfer_history
    WHERE ($1::text IS NULL OR direction = $1)
    ORDER BY finished_at DESC NULLS LAST, updated_at DESC, created_at DESC
    LIMIT $2 OFFSET $3
";

const COUNT_RECORDS: &str = r"
    SELECT COUNT(*) FROM transfer_history WHERE ($1::text IS NULL OR direction = $1)
";

const CLEANUP_OLDER_THAN: &str = r"
    DELETE FROM transfer_history
    WHERE id IN (
        SELECT id FROM transfer_history
        WHERE COALESCE(finished_at, created_at) < $1
        LIMIT $2
    )
";

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Clone, FromRow)]
struct RecordRow {
    id: Uuid,
    direction: String,
    source_task_id: Uuid,
    item_name: String,
    size_bytes: i64,
    status: String,
    error: Option<String>,
    faststart_applied: bool,
    preview_attached: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RecordRow> for TransferRecord {
    fn from(row: RecordRow) -> Self {
        let direction = TransferDirection::parse(&row.direction).unwrap_or_else(|| {
            tracing::warn!(direction = %row.direction, record_id = %row.id, "unknown transfer direction label");
            TransferDirection::Upload
        });
        let status = TransferStatus::parse(&row.status).unwrap_or_else(|| {
            tracing::warn!(status = %row.status, record_id = %row.id, "unknown transfer status label");
            TransferStatus::Error
        });
        Self {
            id: row.id,
            direction,
            source_task_id: row.source_task_id,
            item_name: row.item_name,
            size_bytes: row.size_bytes,
            status,
            error: row.error,
            faststart_applied: row.faststart_applied,
            preview_attached: row.preview_attached,
            started_at: row.started_at,
            finished_at: row.finished_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database-backed repository for the transfer history ledger.
#[derive(Clone)]
pub struct HistoryStore {
    pool: PgPool,
}

impl HistoryStore {
    /// Construct the repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or overwrite the row keyed by `(direction, source_task_id)`.
    ///
    /// Mutable fields are last-writer-wins; a retried transfer overwrites
    /// its earlier outcome.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::Transient`] on database failure.
    pub async fn upsert(&self, record: &TransferRecord) -> DriveResult<TransferRecord> {
        let row = sqlx::query_as::<_, RecordRow>(UPSERT_RECORD)
            .bind(record.id)
            .bind(record.direction.as_str())
            .bind(record.source_task_id)
            .bind(&record.item_name)
            .bind(record.size_bytes)
            .bind(record.status.as_str())
            .bind(record.error.as_deref())
            .bind(record.faststart_applied)
            .bind(record.preview_attached)
            .bind(record.started_at)
            .bind(record.finished_at)
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("history.upsert"))?;
        Ok(row.into())
    }

    /// Paged listing, most recently finished first.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::Transient`] on database failure.
    pub async fn list(
        &self,
        direction: Option<TransferDirection>,
        page: i64,
        page_size: i64,
    ) -> DriveResult<(Vec<TransferRecord>, i64)> {
        let page = page.max(1);
        let page_size = if page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size.min(MAX_PAGE_SIZE)
        };
        let direction_label = direction.map(TransferDirection::as_str);
        let rows = sqlx::query_as::<_, RecordRow>(LIST_RECORDS)
            .bind(direction_label)
            .bind(page_size)
            .bind((page - 1) * page_size)
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("history.list"))?;
        let total: i64 = sqlx::query_scalar(COUNT_RECORDS)
            .bind(direction_label)
            .fetch_one(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("history.list.count"))?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    /// Delete at most `limit` rows finished before `cutoff`.
    ///
    /// The bound keeps any single sweep transaction short; the cleanup
    /// worker calls this until it returns zero.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::Transient`] on database failure.
    pub async fn cleanup_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> DriveResult<u64> {
        let result = sqlx::query(CLEANUP_OLDER_THAN)
            .bind(cutoff)
            .bind(limit)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("history.cleanup"))?;
        Ok(result.rows_affected())
    }
}
