use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Create the locks table if it does not exist.
///
/// The schema matches the shared wire contract: one row per key, with the
/// row kept (owner emptied) across releases so `modified_index` stays
/// monotonic for the key's lifetime.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if the DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let table = config.locks_table();

    let create_locks = format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            path VARCHAR(255) PRIMARY KEY,
            owner VARCHAR(255),
            value VARCHAR(255),
            type VARCHAR(255),
            modified_index BIGINT DEFAULT 0,
            ttl BIGINT DEFAULT 0
        )"
    );

    sqlx::query(&create_locks).execute(pool).await?;

    Ok(())
}
