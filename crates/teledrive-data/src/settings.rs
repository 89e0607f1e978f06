//! Runtime settings singleton repository.
//!
//! Reads are never cached: every caller sees the row as of its own query, so
//! a patch is visible to the next operation without invalidation.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgConnection;
use sqlx::{FromRow, PgPool};
use teledrive_core::{CleanupPolicy, DriveResult, RuntimeSettings, SettingsPatch};

const INSERT_DEFAULTS: &str = r"
    INSERT INTO runtime_settings (
        singleton, upload_concurrency, download_concurrency,
        upload_chunk_size_bytes, reserved_disk_bytes, upload_session_ttl_hours,
        upload_session_cleanup_interval_min, thumbnail_cache_max_bytes,
        thumbnail_cache_ttl_hours, thumbnail_generate_concurrency,
        vault_password_hash, vault_session_ttl_minutes, torrent_cleanup_policy,
        torrent_cleanup_fixed_minutes, torrent_cleanup_min_minutes,
        torrent_cleanup_max_minutes, updated_at
    )
    VALUES (TRUE, $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
    ON CONFLICT (singleton) DO NOTHING
";

const SELECT_SETTINGS: &str = "SELECT * FROM runtime_settings WHERE singleton";

const SELECT_SETTINGS_FOR_UPDATE: &str =
    "SELECT * FROM runtime_settings WHERE singleton FOR UPDATE";

const UPDATE_SETTINGS: &str = r"
    UPDATE runtime_settings
    SET upload_concurrency = $1, download_concurrency = $2,
        upload_chunk_size_bytes = $3, reserved_disk_bytes = $4,
        upload_session_ttl_hours = $5, upload_session_cleanup_interval_min = $6,
        thumbnail_cache_max_bytes = $7, thumbnail_cache_ttl_hours = $8,
        thumbnail_generate_concurrency = $9, vault_password_hash = $10,
        vault_session_ttl_minutes = $11, torrent_cleanup_policy = $12,
        torrent_cleanup_fixed_minutes = $13, torrent_cleanup_min_minutes = $14,
        torrent_cleanup_max_minutes = $15, updated_at = $16
    WHERE singleton
";

#[derive(Debug, Clone, FromRow)]
struct SettingsRow {
    upload_concurrency: i32,
    download_concurrency: i32,
    upload_chunk_size_bytes: i64,
    reserved_disk_bytes: i64,
    upload_session_ttl_hours: i32,
    upload_session_cleanup_interval_min: i32,
    thumbnail_cache_max_bytes: i64,
    thumbnail_cache_ttl_hours: i32,
    thumbnail_generate_concurrency: i32,
    vault_password_hash: Option<String>,
    vault_session_ttl_minutes: i32,
    torrent_cleanup_policy: String,
    torrent_cleanup_fixed_minutes: i32,
    torrent_cleanup_min_minutes: i32,
    torrent_cleanup_max_minutes: i32,
    updated_at: DateTime<Utc>,
}

impl From<SettingsRow> for RuntimeSettings {
    fn from(row: SettingsRow) -> Self {
        let policy = CleanupPolicy::parse(&row.torrent_cleanup_policy).unwrap_or_else(|| {
            tracing::warn!(policy = %row.torrent_cleanup_policy, "unknown cleanup policy label");
            CleanupPolicy::Fixed
        });
        Self {
            upload_concurrency: row.upload_concurrency,
            download_concurrency: row.download_concurrency,
            upload_chunk_size_bytes: row.upload_chunk_size_bytes,
            reserved_disk_bytes: row.reserved_disk_bytes,
            upload_session_ttl_hours: row.upload_session_ttl_hours,
            upload_session_cleanup_interval_min: row.upload_session_cleanup_interval_min,
            thumbnail_cache_max_bytes: row.thumbnail_cache_max_bytes,
            thumbnail_cache_ttl_hours: row.thumbnail_cache_ttl_hours,
            thumbnail_generate_concurrency: row.thumbnail_generate_concurrency,
            vault_password_hash: row.vault_password_hash,
            vault_session_ttl_minutes: row.vault_session_ttl_minutes,
            torrent_cleanup_policy: policy,
            torrent_cleanup_fixed_minutes: row.torrent_cleanup_fixed_minutes,
            torrent_cleanup_min_minutes: row.torrent_cleanup_min_minutes,
            torrent_cleanup_max_minutes: row.torrent_cleanup_max_minutes,
            updated_at: row.updated_at,
        }
    }
}

/// Database-backed repository for the runtime settings singleton.
#[derive(Clone)]
pub struct SettingsStore {
    pool: PgPool,
}

impl SettingsStore {
    /// Construct the repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Return the singleton row, inserting `defaults` first when absent.
    ///
    /// The insert is `ON CONFLICT DO NOTHING`, so concurrent first reads are
    /// idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::Transient`] on database failure.
    pub async fn get_or_init(&self, defaults: &RuntimeSettings) -> DriveResult<RuntimeSettings> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(super::error::map_sqlx_err("settings.acquire"))?;
        insert_defaults(&mut conn, defaults).await?;
        let row = sqlx::query_as::<_, SettingsRow>(SELECT_SETTINGS)
            .fetch_one(&mut *conn)
            .await
            .map_err(super::error::map_sqlx_err("settings.get"))?;
        Ok(row.into())
    }

    /// Apply the non-null fields of `patch` under a row lock and return the
    /// merged, clamped row.
    ///
    /// # Errors
    ///
    /// Returns [`teledrive_core::DriveError::Transient`] on database failure.
    pub async fn update(
        &self,
        patch: SettingsPatch,
        defaults: &RuntimeSettings,
        now: DateTime<Utc>,
    ) -> DriveResult<RuntimeSettings> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(super::error::map_sqlx_err("settings.update.begin"))?;
        insert_defaults(tx.as_mut(), defaults).await?;
        let current: RuntimeSettings =
            sqlx::query_as::<_, SettingsRow>(SELECT_SETTINGS_FOR_UPDATE)
                .fetch_one(tx.as_mut())
                .await
                .map_err(super::error::map_sqlx_err("settings.update.lock"))?
                .into();
        let merged = current.apply(patch, now);
        sqlx::query(UPDATE_SETTINGS)
            .bind(merged.upload_concurrency)
            .bind(merged.download_concurrency)
            .bind(merged.upload_chunk_size_bytes)
            .bind(merged.reserved_disk_bytes)
            .bind(merged.upload_session_ttl_hours)
            .bind(merged.upload_session_cleanup_interval_min)
            .bind(merged.thumbnail_cache_max_bytes)
            .bind(merged.thumbnail_cache_ttl_hours)
            .bind(merged.thumbnail_generate_concurrency)
            .bind(merged.vault_password_hash.as_deref())
            .bind(merged.vault_session_ttl_minutes)
            .bind(merged.torrent_cleanup_policy.as_str())
            .bind(merged.torrent_cleanup_fixed_minutes)
            .bind(merged.torrent_cleanup_min_minutes)
            .bind(merged.torrent_cleanup_max_minutes)
            .bind(merged.updated_at)
            .execute(tx.as_mut())
            .await
            .map_err(super::error::map_sqlx_err("settings.update.write"))?;
        tx.commit()
            .await
            .map_err(super::error::map_sqlx_err("settings.update.commit"))?;
        Ok(merged)
    }
}

async fn insert_defaults(
    conn: &mut PgConnection,
    defaults: &RuntimeSettings,
) -> DriveResult<()> {
    sqlx::query(INSERT_DEFAULTS)
        .bind(defaults.upload_concurrency)
        .bind(defaults.download_concurrency)
        .bind(defaults.upload_chunk_size_bytes)
        .bind(defaults.reserved_disk_bytes)
        .bind(defaults.upload_session_ttl_hours)
        .bind(defaults.upload_session_cleanup_interval_min)
        .bind(defaults.thumbnail_cache_max_bytes)
        .bind(defaults.thumbnail_cache_ttl_hours)
        .bind(defaults.thumbnail_generate_concurrency)
        .bind(defaults.vault_password_hash.as_deref())
        .bind(defaults.vault_session_ttl_minutes)
        .bind(defaults.torrent_cleanup_policy.as_str())
        .bind(defaults.torrent_cleanup_fixed_minutes)
        .bind(defaults.torrent_cleanup_min_minutes)
        .bind(defaults.torrent_cleanup_max_minutes)
        .bind(defaults.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(super::error::map_sqlx_err("settings.insert_defaults"))?;
    Ok(())
}
