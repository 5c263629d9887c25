//! Database connection management

use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

/// Schema DDL applied by `rfq-app db migrate` and by test bootstrap.
pub const SCHEMA_SQL: &str = include_str!("sql/schema.sql");

/// Upper bound on waiting for a pool connection.
///
/// Resolution calls that block on the store must time out rather than hang;
/// the resulting error surfaces as a storage fault, never as "not found".
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to `PostgreSQL`.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
}

/// Apply the application schema.
///
/// All statements are idempotent (`CREATE TABLE IF NOT EXISTS`), so running
/// this against an already-migrated database is a no-op.
///
/// # Errors
///
/// Returns an error when any DDL statement fails.
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}
