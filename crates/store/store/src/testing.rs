//! Conformance suite run against every [`LockStore`] backend.
//!
//! The memory backend runs this in its unit tests; the SQL backends run it
//! from their `integration`-gated tests against a real database. Keys are
//! namespaced per scenario so the suite can run against a shared table.

use latch_core::{Lock, Resource, TypeCode};

use crate::error::StoreError;
use crate::store::LockStore;

/// Exercise the full lock store contract against `store`.
///
/// # Errors
///
/// Returns the first unexpected [`StoreError`]; contract violations panic
/// with a descriptive assertion message.
pub async fn run_lock_store_conformance_tests(store: &dyn LockStore) -> Result<(), StoreError> {
    acquire_assigns_indexes_and_echoes_inputs(store).await?;
    renewal_same_owner_increments(store).await?;
    collision_leaves_holder_untouched(store).await?;
    release_vacates_and_preserves_index_sequence(store).await?;
    release_requires_matching_owner(store).await?;
    release_of_unknown_key_is_not_found(store).await?;
    fetch_all_and_count_filter_by_type(store).await?;
    fetch_and_release_is_index_fenced(store).await?;
    Ok(())
}

async fn acquire_assigns_indexes_and_echoes_inputs(
    store: &dyn LockStore,
) -> Result<(), StoreError> {
    let resource = Resource::new("conformance/acquire", "owner-1", "payload", TypeCode::Lock);

    let lock = store.lock(&resource, 10).await?;
    assert_eq!(lock.modified_index, 1, "first acquire starts the sequence");
    assert_eq!(lock.ttl_in_seconds, 10);
    assert_eq!(lock.resource, resource);

    let fetched = store.fetch(&resource.key).await?;
    assert_eq!(fetched.resource, resource);
    assert_eq!(fetched.modified_index, 1);
    assert_eq!(fetched.ttl_in_seconds, 10);
    Ok(())
}

async fn renewal_same_owner_increments(store: &dyn LockStore) -> Result<(), StoreError> {
    let resource = Resource::new("conformance/renewal", "owner-1", "v", TypeCode::Lock);

    let first = store.lock(&resource, 10).await?;
    let second = store.lock(&resource, 25).await?;
    assert_eq!(second.modified_index, first.modified_index + 1);
    assert_eq!(second.ttl_in_seconds, 25, "renewal carries the new ttl");

    let fetched = store.fetch(&resource.key).await?;
    assert_eq!(fetched.modified_index, second.modified_index);
    Ok(())
}

async fn collision_leaves_holder_untouched(store: &dyn LockStore) -> Result<(), StoreError> {
    let holder = Resource::new("conformance/collision", "owner-1", "v1", TypeCode::Lock);
    let challenger = Resource::new("conformance/collision", "owner-2", "v2", TypeCode::Lock);

    store.lock(&holder, 10).await?;
    let err = store
        .lock(&challenger, 10)
        .await
        .expect_err("second owner must collide");
    assert!(matches!(err, StoreError::LockCollision), "got {err:?}");

    let fetched = store.fetch(&holder.key).await?;
    assert_eq!(fetched.resource.owner, "owner-1");
    assert_eq!(fetched.resource.value, "v1");
    Ok(())
}

async fn release_vacates_and_preserves_index_sequence(
    store: &dyn LockStore,
) -> Result<(), StoreError> {
    let resource = Resource::new("conformance/release", "owner-1", "v", TypeCode::Lock);

    let lock = store.lock(&resource, 10).await?;
    store.release(&resource).await?;

    let err = store
        .fetch(&resource.key)
        .await
        .expect_err("released key must read as absent");
    assert!(matches!(err, StoreError::ResourceNotFound), "got {err:?}");

    // The vacant row keeps the counter: release bumped it once, and the
    // next acquirer continues from there even with a different owner.
    let successor = Resource::new("conformance/release", "owner-2", "v2", TypeCode::Lock);
    let relocked = store.lock(&successor, 10).await?;
    assert_eq!(relocked.modified_index, lock.modified_index + 2);
    Ok(())
}

async fn release_requires_matching_owner(store: &dyn LockStore) -> Result<(), StoreError> {
    let holder = Resource::new("conformance/release-auth", "owner-1", "v", TypeCode::Lock);
    let intruder = Resource::new("conformance/release-auth", "owner-2", "v", TypeCode::Lock);

    store.lock(&holder, 10).await?;
    let err = store
        .release(&intruder)
        .await
        .expect_err("release by another owner must fail");
    assert!(matches!(err, StoreError::LockCollision), "got {err:?}");

    store.release(&holder).await?;

    // Releasing the now-vacant row reads as absent, not as a collision.
    let err = store
        .release(&holder)
        .await
        .expect_err("double release must fail");
    assert!(matches!(err, StoreError::ResourceNotFound), "got {err:?}");
    Ok(())
}

async fn release_of_unknown_key_is_not_found(store: &dyn LockStore) -> Result<(), StoreError> {
    let resource = Resource::new("conformance/never-acquired", "owner-1", "v", TypeCode::Lock);
    let err = store
        .release(&resource)
        .await
        .expect_err("release of a never-acquired key must fail");
    assert!(matches!(err, StoreError::ResourceNotFound), "got {err:?}");
    Ok(())
}

async fn fetch_all_and_count_filter_by_type(store: &dyn LockStore) -> Result<(), StoreError> {
    let a = Resource::new("conformance/all/a", "owner-1", "v", TypeCode::Lock);
    let b = Resource::new("conformance/all/b", "owner-2", "v", TypeCode::Presence);
    let c = Resource::new("conformance/all/c", "owner-3", "v", TypeCode::Lock);
    let released = Resource::new("conformance/all/released", "owner-4", "v", TypeCode::Lock);

    for resource in [&a, &b, &c, &released] {
        store.lock(resource, 10).await?;
    }
    store.release(&released).await?;

    let keys = |locks: Vec<Lock>| {
        let mut keys: Vec<String> = locks
            .into_iter()
            .map(|lock| lock.resource.key)
            .filter(|key| key.starts_with("conformance/all/"))
            .collect();
        keys.sort();
        keys
    };

    let all = keys(store.fetch_all(None).await?);
    assert_eq!(
        all,
        vec!["conformance/all/a", "conformance/all/b", "conformance/all/c"],
        "vacant rows must be filtered"
    );

    let locks_only = keys(store.fetch_all(Some("lock")).await?);
    assert_eq!(locks_only, vec!["conformance/all/a", "conformance/all/c"]);

    let presences_only = keys(store.fetch_all(Some("presence")).await?);
    assert_eq!(presences_only, vec!["conformance/all/b"]);

    assert!(store.count(None).await? >= 3);
    assert!(store.count(Some("presence")).await? >= 1);
    Ok(())
}

async fn fetch_and_release_is_index_fenced(store: &dyn LockStore) -> Result<(), StoreError> {
    let resource = Resource::new("conformance/fenced", "owner-1", "v", TypeCode::Presence);

    let first = store.lock(&resource, 10).await?;
    let renewed = store.lock(&resource, 10).await?;

    // A watcher holding the superseded generation must not release.
    assert!(!store.fetch_and_release(&first).await?);
    let fetched = store.fetch(&resource.key).await?;
    assert_eq!(fetched.modified_index, renewed.modified_index);

    // The current generation releases exactly once.
    assert!(store.fetch_and_release(&renewed).await?);
    let err = store
        .fetch(&resource.key)
        .await
        .expect_err("expired key must read as absent");
    assert!(matches!(err, StoreError::ResourceNotFound), "got {err:?}");

    // Firing again against the vacant row is a no-op.
    assert!(!store.fetch_and_release(&renewed).await?);
    Ok(())
}
