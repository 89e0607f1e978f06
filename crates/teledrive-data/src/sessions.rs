//! Upload session repository.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use teledrive_core::{DriveError, DriveResult, SessionStatus, UploadSession};
use uuid::Uuid;

const INSERT_SESSION: &str = r"
    INSERT INTO upload_sessions (
        id, item_id, tg_chat_id, file_name, mime_type, total_size, chunk_size,
        total_chunks, status, access_method, created_at, updated_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
";

const SELECT_SESSION: &str = "SELECT * FROM upload_sessions WHERE id = $1";

const TOUCH_SESSION: &str = "UPDATE upload_sessions SET updated_at = $2 WHERE id = $1";

const SET_STATUS: &str = r"
    UPDATE upload_sessions SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *
";

const LIST_EXPIRED: &str = r"
    SELECT * FROM upload_sessions
    WHERE status <> 'completed' AND updated_at < $1
    ORDER BY updated_at ASC
    LIMIT $2
";

const DELETE_SESSION: &str = "DELETE FROM upload_sessions WHERE id = $1";

#[derive(Debug, Clone, FromRow)]
struct SessionRow {
    id: Uuid,
    item_id: Uuid,
    tg_chat_id: i64,
    file_name: String,
    mime_type: Option<String>,
    total_size: i64,
    chunk_size: i64,
    total_chunks: i32,
    status: String,
    access_method: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for UploadSession {
    fn from(row: SessionRow) -> Self {
        let status = SessionStatus::parse(&row.status).unwrap_or_else(|| {
            tracing::warn!(status = %row.status, session_id = %row.id, "unknown session status label");
            SessionStatus::Failed
        });
        Self {
            id: row.id,
            item_id: row.item_id,
            tg_chat_id: row.tg_chat_id,
            file_name: row.file_name,
            mime_type: row.mime_type,
            total_size: row.total_size,
            chunk_size: row.chunk_size,
            total_chunks: row.total_chunks,
            status,
            access_method: row.access_method,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Database-backed repository for upload sessions.
#[derive(Clone)]
pub struct SessionStore {
    pool: PgPool,
}

impl SessionStore {
    /// Construct the repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a freshly created session.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::BadInput`] when the bound item is missing and
    /// [`DriveError::Conflict`] on an id collision.
    pub async fn insert(&self, session: &UploadSession) -> DriveResult<()> {
        sqlx::query(INSERT_SESSION)
            .bind(session.id)
            .bind(session.item_id)
            .bind(session.tg_chat_id)
            .bind(&session.file_name)
            .bind(session.mime_type.as_deref())
            .bind(session.total_size)
            .bind(session.chunk_size)
            .bind(session.total_chunks)
            .bind(session.status.as_str())
            .bind(&session.access_method)
            .bind(session.created_at)
            .bind(session.updated_at)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("sessions.insert"))?;
        Ok(())
    }

    /// Fetch one session.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when absent.
    pub async fn get(&self, id: Uuid) -> DriveResult<UploadSession> {
        sqlx::query_as::<_, SessionRow>(SELECT_SESSION)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("sessions.get"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("upload session"))
    }

    /// Bump `updated_at` after a chunk write.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the session is absent.
    pub async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> DriveResult<()> {
        let result = sqlx::query(TOUCH_SESSION)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("sessions.touch"))?;
        if result.rows_affected() == 0 {
            return Err(DriveError::not_found("upload session"));
        }
        Ok(())
    }

    /// Transition the session lifecycle state.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::NotFound`] when the session is absent.
    pub async fn set_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        now: DateTime<Utc>,
    ) -> DriveResult<UploadSession> {
        sqlx::query_as::<_, SessionRow>(SET_STATUS)
            .bind(id)
            .bind(status.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("sessions.set_status"))?
            .map(Into::into)
            .ok_or(DriveError::not_found("upload session"))
    }

    /// Unfinished sessions idle since before `cutoff`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn list_expired(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> DriveResult<Vec<UploadSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(LIST_EXPIRED)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("sessions.list_expired"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Remove one session row.
    ///
    /// # Errors
    ///
    /// Returns [`DriveError::Transient`] on database failure.
    pub async fn delete(&self, id: Uuid) -> DriveResult<u64> {
        let result = sqlx::query(DELETE_SESSION)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(super::error::map_sqlx_err("sessions.delete"))?;
        Ok(result.rows_affected())
    }
}
