use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use latch_core::{Lock, Resource, TypeCode};
use latch_store::error::StoreError;
use latch_store::store::LockStore;

/// One slot in the registry. An empty `owner` marks the row vacant while
/// keeping `modified_index` alive for the next acquirer.
#[derive(Debug, Clone)]
struct LockRow {
    owner: String,
    value: String,
    type_name: String,
    modified_index: i64,
    ttl_in_seconds: i64,
}

impl LockRow {
    fn is_vacant(&self) -> bool {
        self.owner.is_empty()
    }

    fn to_lock(&self, key: &str) -> Lock {
        Lock::new(
            Resource {
                key: key.to_owned(),
                owner: self.owner.clone(),
                value: self.value.clone(),
                type_name: self.type_name.clone(),
                type_code: TypeCode::from_name(&self.type_name),
            },
            self.ttl_in_seconds,
            self.modified_index,
        )
    }
}

/// In-memory [`LockStore`] backed by a [`DashMap`].
///
/// The map's entry API serializes all mutations of one key, giving the
/// same single-row transactional behavior as the SQL backends. Used by
/// unit tests and as a standalone development backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockStore {
    rows: Arc<DashMap<String, LockRow>>,
}

impl MemoryLockStore {
    /// Create an empty in-memory lock store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn lock(&self, resource: &Resource, ttl_in_seconds: i64) -> Result<Lock, StoreError> {
        match self.rows.entry(resource.key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let row = occupied.get_mut();
                if !row.is_vacant() && row.owner != resource.owner {
                    return Err(StoreError::LockCollision);
                }
                row.owner = resource.owner.clone();
                row.value = resource.value.clone();
                row.type_name = resource.type_name.clone();
                row.ttl_in_seconds = ttl_in_seconds;
                row.modified_index += 1;
                Ok(Lock::new(
                    resource.clone(),
                    ttl_in_seconds,
                    row.modified_index,
                ))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(LockRow {
                    owner: resource.owner.clone(),
                    value: resource.value.clone(),
                    type_name: resource.type_name.clone(),
                    modified_index: 1,
                    ttl_in_seconds,
                });
                Ok(Lock::new(resource.clone(), ttl_in_seconds, 1))
            }
        }
    }

    async fn release(&self, resource: &Resource) -> Result<(), StoreError> {
        let mut row = self
            .rows
            .get_mut(&resource.key)
            .ok_or(StoreError::ResourceNotFound)?;
        if row.is_vacant() {
            return Err(StoreError::ResourceNotFound);
        }
        if row.owner != resource.owner {
            return Err(StoreError::LockCollision);
        }
        row.owner.clear();
        row.value.clear();
        row.type_name.clear();
        row.modified_index += 1;
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Lock, StoreError> {
        let row = self.rows.get(key).ok_or(StoreError::ResourceNotFound)?;
        if row.is_vacant() {
            return Err(StoreError::ResourceNotFound);
        }
        Ok(row.to_lock(key))
    }

    async fn fetch_all(&self, type_filter: Option<&str>) -> Result<Vec<Lock>, StoreError> {
        let locks = self
            .rows
            .iter()
            .filter(|entry| !entry.is_vacant())
            .filter(|entry| type_filter.is_none_or(|t| entry.type_name == t))
            .map(|entry| entry.to_lock(entry.key()))
            .collect();
        Ok(locks)
    }

    async fn count(&self, type_filter: Option<&str>) -> Result<u64, StoreError> {
        let count = self
            .rows
            .iter()
            .filter(|entry| !entry.is_vacant())
            .filter(|entry| type_filter.is_none_or(|t| entry.type_name == t))
            .count();
        Ok(count as u64)
    }

    async fn fetch_and_release(&self, lock: &Lock) -> Result<bool, StoreError> {
        let Some(mut row) = self.rows.get_mut(lock.key()) else {
            return Ok(false);
        };
        if row.is_vacant()
            || row.owner != lock.owner()
            || row.modified_index != lock.modified_index
        {
            return Ok(false);
        }
        row.owner.clear();
        row.value.clear();
        row.type_name.clear();
        row.modified_index += 1;
        Ok(true)
    }
}
