use sqlx::MySqlPool;

use crate::config::MysqlConfig;

/// Create the locks table if it does not exist.
///
/// Same schema as the `PostgreSQL` backend; rows are never deleted, only
/// vacated, so `modified_index` stays monotonic per key.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if the DDL statement fails.
pub async fn run_migrations(pool: &MySqlPool, config: &MysqlConfig) -> Result<(), sqlx::Error> {
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
