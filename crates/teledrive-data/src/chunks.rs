//! Chunk repository: blob-tier message bookkeeping per item.

use sqlx::{FromRow, PgPool};
use chrono::{DateTime, Utc};
use teledrive_core::{Chunk, ChunkRef, DriveResult, escape_like, validate_prefix};
use uuid::Uuid;

const INSERT_CHUNK: &str = r"
    INSERT INTO telegram_chunks (
        id, item_id, chunk_index, chunk_size, tg_chat_id, tg_message_id,
        tg_file_id, tg_file_unique_id, created_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (item_id, chunk_index) DO NOTHING
";

const LIST_FOR_ITEM: &str = r"
    SELECT * FROM telegram_chunks WHERE item_id = $1 ORDER BY chunk_index ASC
";

const UPLOADED_INDICES: &str = r"
    SELECT chunk_index FROM telegram_chunks WHERE item_id = $1 ORDER BY chunk_index ASC
";

const REFS_FOR_ITEM: &str = r"
    SELECT tg_chat_id, tg_message_id FROM telegram_chunks
    WHERE item_id = $1
    ORDER BY tg_message_id ASC
";

const REFS_BY_PATH_PREFIX: &str = r"
    SELECT c.tg_chat_id, c.tg_message_id
    FROM telegram_chunks c
    JOIN items i ON i.id = c.item_id
    WHERE i.path = $1 OR i.path LIKE $2
    ORDER BY c.tg_message_id ASC
";

const TOTAL_SIZE: &str = r"
    SELECT COALESCE(SUM(chunk_size), 0) FROM telegram_chunks WHERE item_id = $1
";

const DELETE_FOR_ITEM: &str = "DELETE FROM telegram_chunks WHERE item_id = $1";

#[derive(Debug, Clone, FromRow)]
struct ChunkRow {
    id: Uuid,
    item_id: Uuid,
    chunk_index: i32,
    chunk_size: i64,
    tg_chat_id: i64,
    tg_message_id: i64,
    tg_file_id: String,
    tg_file_unique_id: String,
    created_at: DateTime<Utc>,
}

impl From<ChunkRow> for Chunk {
    fn from(row: ChunkRow) -> Self {
        Self {
            id: row.id,
            item_id: row.item_id,
            chunk_index: row.chunk_index,
            chunk_size: row.chunk_size,
            tg_chat_id: row.tg_chat_id,
            tg_message_id: row.tg_message_id,
            tg_file_id: row.tg_file_id,
            tg_file_unique_id: row.tg_file_unique_id,
            created_at: row.created_at,
        }
    }
}

/// Database-backed repository for blob chunks.
#[derive(Clone)]
pub struct ChunkStore {
    pool: PgPool,
}

impl ChunkStore {
    /// Construct the repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one chunk row.
    ///
    /// Returns `false` when a row for `(item_id, chunk_index)` already
    /// exists; the caller then owns the orphaned blob message.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::Conflict`] when the blob-tier
    /// reference `(tg_chat_id, tg_message_id)` is already recorded.
    pub async fn insert(&self, chunk: &Chunk) -> DriveResult<bool> {
        let result = sqlx::query(INSERT_CHUNK)
            .bind(chunk.id)
            .bind(chunk.item_id)
            .bind(chunk.chunk_index)
            .bind(chunk.chunk_size)
            .bind(chunk.tg_chat_id)
            .bind(chunk.tg_message_id)
            .bind(&chunk.tg_file_id)
            .bind(&chunk.tg_file_unique_id)
            .bind(chunk.created_at)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("chunks.insert"))?;
        Ok(result.rows_affected() == 1)
    }

    /// All chunks of one item, ordered by index.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::Transient`] on database failure.
    pub async fn list_for_item(&self, item_id: Uuid) -> DriveResult<Vec<Chunk>> {
        let rows = sqlx::query_as::<_, ChunkRow>(LIST_FOR_ITEM)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("chunks.list_for_item"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// The set of chunk indexes already persisted for one item.
    ///
    /// The result only grows over a session's lifetime; a recorded chunk is
    /// never removed while its session is live.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::Transient`] on database failure.
    pub async fn uploaded_indices(&self, item_id: Uuid) -> DriveResult<Vec<i32>> {
        sqlx::query_scalar(UPLOADED_INDICES)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("chunks.uploaded_indices"))
    }

    /// Blob references of one item, ordered by message id.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::Transient`] on database failure.
    pub async fn refs_for_item(&self, item_id: Uuid) -> DriveResult<Vec<ChunkRef>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(REFS_FOR_ITEM)
            .bind(item_id)
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("chunks.refs_for_item"))?;
        Ok(rows
            .into_iter()
            .map(|(chat_id, message_id)| ChunkRef {
                chat_id,
                message_id,
            })
            .collect())
    }

    /// Blob references owned by the subtree at `prefix`, ordered by message
    /// id to stay friendly to per-chat rate limits.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::BadInput`] when the prefix is
    /// not absolute.
    pub async fn refs_by_path_prefix(&self, prefix: &str) -> DriveResult<Vec<ChunkRef>> {
        validate_prefix(prefix)?;
        let rows: Vec<(i64, i64)> = sqlx::query_as(REFS_BY_PATH_PREFIX)
            .bind(prefix)
            .bind(format!("{}/%", escape_like(prefix)))
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("chunks.refs_by_prefix"))?;
        Ok(rows
            .into_iter()
            .map(|(chat_id, message_id)| ChunkRef {
                chat_id,
                message_id,
            })
            .collect())
    }

    /// Sum of recorded chunk sizes for one item.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::Transient`] on database failure.
    pub async fn total_size(&self, item_id: Uuid) -> DriveResult<i64> {
        sqlx::query_scalar(TOTAL_SIZE)
            .bind(item_id)
            .fetch_one(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("chunks.total_size"))
    }

    /// Remove all chunk rows of one item.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::Transient`] on database failure.
    pub async fn delete_for_item(&self, item_id: Uuid) -> DriveResult<u64> {
        let result = sqlx::query(DELETE_FOR_ITEM)
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("chunks.delete_for_item"))?;
        Ok(result.rows_affected())
    }
}
