use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use latch_core::{Lock, Resource, TypeCode};
use latch_store::error::StoreError;
use latch_store::store::LockStore;

use crate::config::PostgresConfig;
use crate::migrations;

/// PostgreSQL-backed implementation of [`LockStore`].
///
/// Every mutation runs as one short transaction that reads the key's row
/// with `SELECT ... FOR UPDATE` before writing, so concurrent operations
/// on the same key serialize on the row lock and read-committed isolation
/// is sufficient.
#[derive(Debug)]
pub struct PostgresLockStore {
    pool: PgPool,
    config: Arc<PostgresConfig>,
}

impl PostgresLockStore {
    /// Create a new `PostgresLockStore` from the provided configuration.
    ///
    /// Connects to `PostgreSQL`, creates the connection pool, and runs
    /// migrations to ensure the locks table exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if pool creation fails, or the
    /// classified error if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Self::from_pool(pool, config).await
    }

    /// Create a `PostgresLockStore` from an existing pool and config.
    ///
    /// Runs migrations on creation.
    ///
    /// # Errors
    ///
    /// Returns the classified [`StoreError`] if migrations fail.
    pub async fn from_pool(pool: PgPool, config: PostgresConfig) -> Result<Self, StoreError> {
        migrations::run_migrations(&pool, &config)
            .await
            .map_err(classify)?;

        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }
}

/// Sort a raw `sqlx` error into the store taxonomy.
///
/// A closed pool or a missing locks table (SQLSTATE `42P01`) cannot heal
/// without a restart; everything else is treated as transient.
fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolClosed => StoreError::Unrecoverable("connection pool closed".to_owned()),
        sqlx::Error::Database(db) if db.code().as_deref() == Some("42P01") => {
            StoreError::Unrecoverable(format!("locks table missing: {}", db.message()))
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

/// Row image as read inside a transaction: owner, value, type,
/// modified_index, ttl. String columns are nullable in the schema.
type RawRow = (Option<String>, Option<String>, Option<String>, i64, i64);

fn row_to_lock(key: &str, row: &RawRow) -> Lock {
    let (owner, value, type_name, modified_index, ttl) = row;
    let type_name = type_name.clone().unwrap_or_default();
    Lock::new(
        Resource {
            key: key.to_owned(),
            owner: owner.clone().unwrap_or_default(),
            value: value.clone().unwrap_or_default(),
            type_code: TypeCode::from_name(&type_name),
            type_name,
        },
        *ttl,
        *modified_index,
    )
}

#[async_trait]
impl LockStore for PostgresLockStore {
    async fn lock(&self, resource: &Resource, ttl_in_seconds: i64) -> Result<Lock, StoreError> {
        let table = self.config.locks_table();
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let select =
            format!("SELECT owner, value, type, modified_index, ttl FROM {table} WHERE path = $1 FOR UPDATE");
        let row: Option<RawRow> = sqlx::query_as(&select)
            .bind(&resource.key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?;

        let index = match &row {
            None => 0,
            Some((owner, _, _, index, _)) => {
                let owner = owner.as_deref().unwrap_or_default();
                if !owner.is_empty() && owner != resource.owner {
                    return Err(StoreError::LockCollision);
                }
                *index
            }
        };
        let new_index = index + 1;

        let upsert = format!(
            "INSERT INTO {table} (path, owner, value, type, modified_index, ttl) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (path) DO UPDATE \
             SET owner = EXCLUDED.owner, \
                 value = EXCLUDED.value, \
                 type = EXCLUDED.type, \
                 modified_index = EXCLUDED.modified_index, \
                 ttl = EXCLUDED.ttl"
        );
        sqlx::query(&upsert)
            .bind(&resource.key)
            .bind(&resource.owner)
            .bind(&resource.value)
            .bind(&resource.type_name)
            .bind(new_index)
            .bind(ttl_in_seconds)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

        if row.is_none() {
            tracing::info!(key = %resource.key, owner = %resource.owner, "acquired lock");
        }

        Ok(Lock::new(resource.clone(), ttl_in_seconds, new_index))
    }

    async fn release(&self, resource: &Resource) -> Result<(), StoreError> {
        let table = self.config.locks_table();
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let select =
            format!("SELECT owner, modified_index FROM {table} WHERE path = $1 FOR UPDATE");
        let row: Option<(Option<String>, i64)> = sqlx::query_as(&select)
            .bind(&resource.key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?;

        let Some((owner, index)) = row else {
            return Err(StoreError::ResourceNotFound);
        };
        let owner = owner.unwrap_or_default();
        if owner.is_empty() {
            return Err(StoreError::ResourceNotFound);
        }
        if owner != resource.owner {
            return Err(StoreError::LockCollision);
        }

        let vacate = format!(
            "UPDATE {table} \
             SET owner = '', value = '', type = '', modified_index = $1 \
             WHERE path = $2"
        );
        sqlx::query(&vacate)
            .bind(index + 1)
            .bind(&resource.key)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        tx.commit().await.map_err(classify)?;

        tracing::info!(key = %resource.key, owner = %resource.owner, "released lock");
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Lock, StoreError> {
        let table = self.config.locks_table();

        let select =
            format!("SELECT owner, value, type, modified_index, ttl FROM {table} WHERE path = $1");
        let row: Option<RawRow> = sqlx::query_as(&select)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        let Some(row) = row else {
            return Err(StoreError::ResourceNotFound);
        };
        if row.0.as_deref().unwrap_or_default().is_empty() {
            return Err(StoreError::ResourceNotFound);
        }

        Ok(row_to_lock(key, &row))
    }

    async fn fetch_all(&self, type_filter: Option<&str>) -> Result<Vec<Lock>, StoreError> {
        let table = self.config.locks_table();

        let mut select = format!(
            "SELECT path, owner, value, type, modified_index, ttl FROM {table} WHERE owner <> ''"
        );
        if type_filter.is_some() {
            select.push_str(" AND type = $1");
        }

        let mut query = sqlx::query_as::<_, (String, Option<String>, Option<String>, Option<String>, i64, i64)>(&select);
        if let Some(type_name) = type_filter {
            query = query.bind(type_name);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(classify)?;

        Ok(rows
            .into_iter()
            .map(|(path, owner, value, type_name, index, ttl)| {
                row_to_lock(&path, &(owner, value, type_name, index, ttl))
            })
            .collect())
    }

    async fn count(&self, type_filter: Option<&str>) -> Result<u64, StoreError> {
        let table = self.config.locks_table();

        let mut select = format!("SELECT COUNT(*) FROM {table} WHERE owner <> ''");
        if type_filter.is_some() {
            select.push_str(" AND type = $1");
        }

        let mut query = sqlx::query_as::<_, (i64,)>(&select);
        if let Some(type_name) = type_filter {
            query = query.bind(type_name);
        }

        let (count,) = query.fetch_one(&self.pool).await.map_err(classify)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn fetch_and_release(&self, lock: &Lock) -> Result<bool, StoreError> {
        let table = self.config.locks_table();
        let mut tx = self.pool.begin().await.map_err(classify)?;

        let select =
            format!("SELECT owner, modified_index FROM {table} WHERE path = $1 FOR UPDATE");
        let row: Option<(Option<String>, i64)> = sqlx::query_as(&select)
            .bind(lock.key())
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?;

        let Some((owner, index)) = row else {
            return Ok(false);
        };
        let owner = owner.unwrap_or_default();
        if owner.is_empty() || owner != lock.owner() || index != lock.modified_index {
            return Ok(false);
        }

        let vacate = format!(
            "UPDATE {table} \
             SET owner = '', value = '', type = '', modified_index = $1 \
             WHERE path = $2"
        );
        sqlx::query(&vacate)
            .bind(index + 1)
            .bind(lock.key())
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(true)
    }
}
