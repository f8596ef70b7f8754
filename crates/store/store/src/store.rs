use async_trait::async_trait;

use latch_core::{Lock, Resource};

use crate::error::StoreError;

/// Transactional CRUD over the `locks` table.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
/// Every mutation of a key strictly increments its `modified_index`, and a
/// released or expired key keeps its row (with an empty owner) so the
/// index sequence survives re-acquisition.
#[async_trait]
pub trait LockStore: Send + Sync + std::fmt::Debug {
    /// Acquire or renew the lease on `resource.key`.
    ///
    /// Succeeds when the key is unheld, or already held by
    /// `resource.owner` (a renewal). Returns the persisted lock with its
    /// new `modified_index`.
    ///
    /// # Errors
    ///
    /// [`StoreError::LockCollision`] when a different owner holds the key.
    async fn lock(&self, resource: &Resource, ttl_in_seconds: i64) -> Result<Lock, StoreError>;

    /// Release the lease on `resource.key`, leaving a vacant row.
    ///
    /// # Errors
    ///
    /// [`StoreError::ResourceNotFound`] when no held lease exists;
    /// [`StoreError::LockCollision`] when held by a different owner.
    async fn release(&self, resource: &Resource) -> Result<(), StoreError>;

    /// Read the currently held lease for `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::ResourceNotFound`] when the row is missing or vacant.
    async fn fetch(&self, key: &str) -> Result<Lock, StoreError>;

    /// List currently held leases, optionally restricted to one type.
    /// Vacant rows are never returned.
    async fn fetch_all(&self, type_filter: Option<&str>) -> Result<Vec<Lock>, StoreError>;

    /// Count currently held leases, optionally restricted to one type.
    async fn count(&self, type_filter: Option<&str>) -> Result<u64, StoreError>;

    /// Conditionally release an exact lease generation.
    ///
    /// Vacates the row only when it still carries `lock`'s owner and
    /// `modified_index`; a renewed, re-acquired, or already-vacant key is
    /// left untouched. Returns whether a release happened.
    async fn fetch_and_release(&self, lock: &Lock) -> Result<bool, StoreError>;
}
