//! Pool construction and schema migrations.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use teledrive_core::{DriveError, DriveResult};

const MAX_CONNECTIONS: u32 = 16;

/// Connect to Postgres with the workspace's standard pool settings.
///
/// # Errors
///
/// Returns [`DriveError::Transient`] when the database is unreachable.
pub async fn connect(database_url: &str) -> DriveResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .map_err(|err| DriveError::transient("pool.connect", err))
}

/// Apply all pending schema migrations.
///
/// # Errors
///
/// Returns [`DriveError::Permanent`] when migration execution fails; a
/// half-migrated schema is not retryable without operator intervention.
pub async fn run_migrations(pool: &PgPool) -> DriveResult<()> {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
        .run(pool)
        .await
        .map_err(|err| DriveError::permanent("migrations.run", err))
}
