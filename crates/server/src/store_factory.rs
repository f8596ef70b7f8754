use std::sync::Arc;

use tracing::info;

use latch_store::LockStore;
use latch_store_mysql::{MysqlConfig, MysqlLockStore};
use latch_store_postgres::{PostgresConfig, PostgresLockStore};

use crate::config::DatabaseConfig;
use crate::error::ServerError;

/// Build the configured lock store backend and run its migrations.
///
/// # Errors
///
/// Returns [`ServerError::Config`] for a missing URL or unknown driver,
/// or the store's error if connecting or migrating fails.
pub async fn create_store(config: &DatabaseConfig) -> Result<Arc<dyn LockStore>, ServerError> {
    let url = config
        .url
        .clone()
        .ok_or_else(|| ServerError::Config("database.url is required".to_owned()))?;

    match config.driver.as_str() {
        "postgres" => {
            info!(driver = "postgres", "connecting lock store");
            let store = PostgresLockStore::new(PostgresConfig {
                url,
                pool_size: config.max_connections,
                table_prefix: String::new(),
            })
            .await?;
            Ok(Arc::new(store))
        }
        "mysql" => {
            info!(driver = "mysql", "connecting lock store");
            let store = MysqlLockStore::new(MysqlConfig {
                url,
                pool_size: config.max_connections,
                table_prefix: String::new(),
            })
            .await?;
            Ok(Arc::new(store))
        }
        other => Err(ServerError::Config(format!(
            "unknown database driver: {other} (expected \"postgres\" or \"mysql\")"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_url_is_a_config_error() {
        let config = DatabaseConfig {
            url: None,
            ..DatabaseConfig::default()
        };
        let err = create_store(&config).await.expect_err("must fail");
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[tokio::test]
    async fn unknown_driver_is_a_config_error() {
        let config = DatabaseConfig {
            driver: "sqlite".to_owned(),
            url: Some("sqlite::memory:".to_owned()),
            ..DatabaseConfig::default()
        };
        let err = create_store(&config).await.expect_err("must fail");
        assert!(matches!(err, ServerError::Config(_)));
    }
}
