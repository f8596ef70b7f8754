use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info};

use latch_core::{Lock, TypeCode};
use latch_store::LockStore;

use crate::metrics::ExpirationMetrics;

/// The watcher currently tracking a key, identified by the lease
/// generation it observed at registration.
struct WatcherEntry {
    cancel: oneshot::Sender<()>,
    index: i64,
}

struct Inner {
    store: Arc<dyn LockStore>,
    active: Mutex<HashMap<String, WatcherEntry>>,
    metrics: ExpirationMetrics,
}

/// Arranges for every granted lease to be released exactly once when its
/// TTL elapses, unless the owner renewed it first.
///
/// One watcher task runs per tracked key. A renewal registers a higher
/// `modified_index`, which evicts the older watcher through its cancel
/// signal; registrations carrying an equal or lower index are ignored. A
/// watcher that fires late is harmless: the conditional
/// `fetch_and_release` only vacates the row when it still holds the
/// watcher's exact generation.
#[derive(Clone)]
pub struct TtlScheduler {
    inner: Arc<Inner>,
}

impl TtlScheduler {
    /// Create a scheduler releasing leases through `store`.
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                active: Mutex::new(HashMap::new()),
                metrics: ExpirationMetrics::default(),
            }),
        }
    }

    /// Expiration counters for reporting.
    #[must_use]
    pub fn metrics(&self) -> &ExpirationMetrics {
        &self.inner.metrics
    }

    /// Start (or supersede) TTL tracking for a freshly granted lease.
    ///
    /// Called after every successful acquire or renewal. Two concurrent
    /// renewals may register out of order; only the registration with the
    /// highest `modified_index` keeps a live watcher, so a slow-arriving
    /// older registration can never shorten the effective TTL.
    pub async fn register_ttl(&self, lock: &Lock) {
        let mut active = self.inner.active.lock().await;

        if let Some(current) = active.get(lock.key())
            && current.index >= lock.modified_index
        {
            debug!(
                key = %lock.key(),
                tracked_index = current.index,
                index = lock.modified_index,
                "watcher for an equal or newer lease generation already active"
            );
            return;
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let superseded = active.insert(
            lock.key().to_owned(),
            WatcherEntry {
                cancel: cancel_tx,
                index: lock.modified_index,
            },
        );
        drop(active);

        if let Some(stale) = superseded {
            // The receiver may already be gone if the watcher fired.
            let _ = stale.cancel.send(());
        }

        let inner = Arc::clone(&self.inner);
        let lock = lock.clone();
        tokio::spawn(watch(inner, lock, cancel_rx));
    }

    /// Number of keys currently tracked. Test hook.
    #[doc(hidden)]
    pub async fn tracked_keys(&self) -> usize {
        self.inner.active.lock().await.len()
    }
}

/// One watcher: sleep out the TTL or exit on cancellation, then release
/// the lease iff it was not renewed while we slept.
async fn watch(inner: Arc<Inner>, lock: Lock, cancel: oneshot::Receiver<()>) {
    let ttl = Duration::from_secs(u64::try_from(lock.ttl_in_seconds).unwrap_or(0));

    tokio::select! {
        _ = cancel => {
            debug!(key = %lock.key(), index = lock.modified_index, "watcher superseded by renewal");
            return;
        }
        () = tokio::time::sleep(ttl) => {}
    }

    {
        let mut active = inner.active.lock().await;
        if active
            .get(lock.key())
            .is_some_and(|entry| entry.index == lock.modified_index)
        {
            active.remove(lock.key());
        }
    }

    match inner.store.fetch_and_release(&lock).await {
        Ok(true) => {
            info!(
                key = %lock.key(),
                owner = %lock.owner(),
                index = lock.modified_index,
                "lease expired"
            );
            match lock.resource.type_code {
                TypeCode::Lock => inner.metrics.increment_locks_expired(),
                TypeCode::Presence => inner.metrics.increment_presences_expired(),
                TypeCode::Unknown => {
                    debug!(key = %lock.key(), "expired lease has no recognized type");
                }
            }
        }
        Ok(false) => {
            debug!(
                key = %lock.key(),
                index = lock.modified_index,
                "lease renewed or already vacant, leaving row untouched"
            );
        }
        Err(err) => {
            // A later renewal re-registers tracking for this key.
            error!(
                key = %lock.key(),
                index = lock.modified_index,
                error = %err,
                "failed to release expired lease"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use latch_core::Resource;
    use latch_store::StoreError;
    use latch_store_memory::MemoryLockStore;

    fn scheduler() -> (Arc<MemoryLockStore>, TtlScheduler) {
        let store = Arc::new(MemoryLockStore::new());
        let scheduler = TtlScheduler::new(Arc::clone(&store) as Arc<dyn LockStore>);
        (store, scheduler)
    }

    async fn assert_eventually_vacant(store: &MemoryLockStore, key: &str) {
        for _ in 0..100 {
            if matches!(store.fetch(key).await, Err(StoreError::ResourceNotFound)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("lease on {key} was never released");
    }

    #[tokio::test(start_paused = true)]
    async fn unrenewed_lease_expires_after_ttl() {
        let (store, scheduler) = scheduler();
        let resource = Resource::new("k", "o1", "v", TypeCode::Lock);

        let lock = store.lock(&resource, 10).await.unwrap();
        scheduler.register_ttl(&lock).await;

        // Just before the deadline the lease is still held.
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(store.fetch("k").await.is_ok());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eventually_vacant(&store, "k").await;
        assert_eq!(scheduler.metrics().snapshot().locks_expired, 1);
        assert_eq!(scheduler.tracked_keys().await, 0);

        // Expiry advances the index like any other mutation.
        let relocked = store.lock(&resource, 10).await.unwrap();
        assert_eq!(relocked.modified_index, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_extends_the_deadline() {
        let (store, scheduler) = scheduler();
        let resource = Resource::new("k", "o1", "v", TypeCode::Lock);

        let first = store.lock(&resource, 10).await.unwrap();
        scheduler.register_ttl(&first).await;

        tokio::time::sleep(Duration::from_secs(8)).await;
        let renewed = store.lock(&resource, 10).await.unwrap();
        scheduler.register_ttl(&renewed).await;

        // The original deadline passes; the renewed lease must survive it.
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(store.fetch("k").await.is_ok());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eventually_vacant(&store, "k").await;
        assert_eq!(scheduler.metrics().snapshot().locks_expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_registration_cannot_shorten_the_ttl() {
        let (store, scheduler) = scheduler();
        let resource = Resource::new("k", "o1", "v", TypeCode::Presence);

        let first = store.lock(&resource, 5).await.unwrap();
        let renewed = store.lock(&resource, 30).await.unwrap();

        // Registrations arrive out of order: the newer generation first.
        scheduler.register_ttl(&renewed).await;
        scheduler.register_ttl(&first).await;

        // The stale watcher's deadline passes without a release.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(store.fetch("k").await.is_ok());

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eventually_vacant(&store, "k").await;
        assert_eq!(scheduler.metrics().snapshot().presences_expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_evicts_the_older_watcher() {
        let (store, scheduler) = scheduler();
        let resource = Resource::new("k", "o1", "v", TypeCode::Lock);

        let first = store.lock(&resource, 100).await.unwrap();
        scheduler.register_ttl(&first).await;

        let renewed = store.lock(&resource, 5).await.unwrap();
        scheduler.register_ttl(&renewed).await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eventually_vacant(&store, "k").await;
        assert_eq!(scheduler.metrics().snapshot().locks_expired, 1);

        // The evicted 100s watcher must not fire a second release.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(scheduler.metrics().snapshot().locks_expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_registration_is_idempotent() {
        let (store, scheduler) = scheduler();
        let resource = Resource::new("k", "o1", "v", TypeCode::Lock);

        let lock = store.lock(&resource, 10).await.unwrap();
        scheduler.register_ttl(&lock).await;
        scheduler.register_ttl(&lock).await;

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eventually_vacant(&store, "k").await;
        assert_eq!(scheduler.metrics().snapshot().locks_expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_firing_watcher_leaves_renewed_lease_alone() {
        let (store, scheduler) = scheduler();
        let resource = Resource::new("k", "o1", "v", TypeCode::Lock);

        let first = store.lock(&resource, 5).await.unwrap();
        scheduler.register_ttl(&first).await;

        // Renewed in the store, but the registration never arrives
        // (e.g. the handler lost the race with the timer).
        let renewed = store.lock(&resource, 60).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;

        // The stale watcher fired, observed the newer index, and no-oped.
        let fetched = store.fetch("k").await.unwrap();
        assert_eq!(fetched.modified_index, renewed.modified_index);
        assert_eq!(scheduler.metrics().snapshot().locks_expired, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn explicitly_released_lease_does_not_count_as_expired() {
        let (store, scheduler) = scheduler();
        let resource = Resource::new("k", "o1", "v", TypeCode::Lock);

        let lock = store.lock(&resource, 5).await.unwrap();
        scheduler.register_ttl(&lock).await;
        store.release(&resource).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(scheduler.metrics().snapshot().locks_expired, 0);
    }
}
