use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use latch_core::{
    FetchAllRequest, FetchAllResponse, FetchRequest, FetchResponse, LockRequest, ReleaseRequest,
    TypeCode,
};
use latch_expiration::{ExpirationMetrics, TtlScheduler};
use latch_store::{LockStore, StoreError};

use crate::error::RequestError;
use crate::metrics::{RequestKind, RequestMetrics};

/// Glue between the transport and the lock store.
///
/// Validates requests, routes freshly granted leases to the expiration
/// scheduler, accounts request metrics, and posts to the exit channel when
/// the store reports a fault the process cannot recover from.
pub struct LockHandler {
    store: Arc<dyn LockStore>,
    scheduler: TtlScheduler,
    metrics: Arc<RequestMetrics>,
    exit_tx: mpsc::Sender<()>,
}

impl LockHandler {
    pub fn new(
        store: Arc<dyn LockStore>,
        scheduler: TtlScheduler,
        metrics: Arc<RequestMetrics>,
        exit_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            store,
            scheduler,
            metrics,
            exit_tx,
        }
    }

    /// Request counters for reporting.
    #[must_use]
    pub fn metrics(&self) -> &RequestMetrics {
        &self.metrics
    }

    /// Expiration counters for reporting.
    #[must_use]
    pub fn expiration_metrics(&self) -> &ExpirationMetrics {
        self.scheduler.metrics()
    }

    /// Count currently held leases of the given type.
    pub async fn held_count(&self, type_name: Option<&str>) -> Result<u64, StoreError> {
        self.store.count(type_name).await
    }

    /// Acquire or renew a lease and start TTL tracking for it.
    pub async fn lock(
        &self,
        request: &LockRequest,
        request_id: Option<&str>,
    ) -> Result<(), RequestError> {
        self.monitored(
            RequestKind::Lock,
            request_id,
            &request.resource.key,
            &request.resource.owner,
            self.do_lock(request, request_id),
        )
        .await
    }

    /// Release a held lease.
    pub async fn release(
        &self,
        request: &ReleaseRequest,
        request_id: Option<&str>,
    ) -> Result<(), RequestError> {
        self.monitored(
            RequestKind::Release,
            request_id,
            &request.resource.key,
            &request.resource.owner,
            self.do_release(request, request_id),
        )
        .await
    }

    /// Read the currently held lease for a key.
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        request_id: Option<&str>,
    ) -> Result<FetchResponse, RequestError> {
        self.monitored(
            RequestKind::Fetch,
            request_id,
            &request.key,
            "",
            self.do_fetch(request, request_id),
        )
        .await
    }

    /// List currently held leases, optionally filtered by type.
    pub async fn fetch_all(
        &self,
        request: &FetchAllRequest,
        request_id: Option<&str>,
    ) -> Result<FetchAllResponse, RequestError> {
        self.monitored(
            RequestKind::FetchAll,
            request_id,
            "",
            "",
            self.do_fetch_all(request, request_id),
        )
        .await
    }

    /// Meter one request around `operation`.
    ///
    /// The drop guard restores the in-flight gauge and records latency
    /// even when the transport drops the request future mid-flight; that
    /// path is also what counts and logs cancellations.
    async fn monitored<T>(
        &self,
        kind: RequestKind,
        request_id: Option<&str>,
        key: &str,
        owner: &str,
        operation: impl Future<Output = Result<T, RequestError>>,
    ) -> Result<T, RequestError> {
        self.metrics.increment_started(kind);
        self.metrics.increment_in_flight(kind);
        let mut monitor = RequestMonitor {
            metrics: Arc::clone(&self.metrics),
            kind,
            start: Instant::now(),
            request_id: request_id.map(str::to_owned),
            key: key.to_owned(),
            owner: owner.to_owned(),
            completed: false,
        };

        let result = operation.await;
        monitor.completed = true;
        drop(monitor);

        match &result {
            Ok(_) => self.metrics.increment_succeeded(kind),
            Err(err) if err.is_collision() => self.metrics.increment_succeeded(kind),
            Err(err) => {
                self.metrics.increment_failed(kind);
                self.exit_if_unrecoverable(err);
            }
        }
        result
    }

    fn exit_if_unrecoverable(&self, err: &RequestError) {
        if !err.is_unrecoverable() {
            return;
        }
        error!(error = %err, "unrecoverable storage error");
        // Single-slot channel: a pending signal means the supervisor is
        // already on its way down, so duplicates are dropped.
        let _ = self.exit_tx.try_send(());
    }

    async fn do_lock(
        &self,
        request: &LockRequest,
        request_id: Option<&str>,
    ) -> Result<(), RequestError> {
        let resource = request.resource.normalized();

        if resource.type_code == TypeCode::Unknown {
            debug!(
                key = %resource.key,
                type_name = %resource.type_name,
                "rejected lock request with unknown type"
            );
            return Err(RequestError::InvalidType);
        }
        if request.ttl_in_seconds <= 0 {
            debug!(
                key = %resource.key,
                ttl = request.ttl_in_seconds,
                "rejected lock request with non-positive ttl"
            );
            return Err(RequestError::InvalidTtl);
        }
        if resource.owner.is_empty() {
            debug!(key = %resource.key, "rejected lock request with empty owner");
            return Err(RequestError::InvalidOwner);
        }

        match self.store.lock(&resource, request.ttl_in_seconds).await {
            Ok(lock) => {
                self.scheduler.register_ttl(&lock).await;
                Ok(())
            }
            Err(StoreError::LockCollision) => {
                debug!(
                    key = %resource.key,
                    owner = %resource.owner,
                    "lock already held by another owner"
                );
                Err(StoreError::LockCollision.into())
            }
            Err(err) => {
                error!(
                    request_id = request_id.unwrap_or_default(),
                    key = %resource.key,
                    owner = %resource.owner,
                    error = %err,
                    "failed to acquire lock"
                );
                Err(err.into())
            }
        }
    }

    async fn do_release(
        &self,
        request: &ReleaseRequest,
        request_id: Option<&str>,
    ) -> Result<(), RequestError> {
        let resource = request.resource.normalized();

        match self.store.release(&resource).await {
            Ok(()) => Ok(()),
            Err(err @ (StoreError::LockCollision | StoreError::ResourceNotFound)) => {
                debug!(
                    key = %resource.key,
                    owner = %resource.owner,
                    error = %err,
                    "release refused"
                );
                Err(err.into())
            }
            Err(err) => {
                error!(
                    request_id = request_id.unwrap_or_default(),
                    key = %resource.key,
                    owner = %resource.owner,
                    error = %err,
                    "failed to release lock"
                );
                Err(err.into())
            }
        }
    }

    async fn do_fetch(
        &self,
        request: &FetchRequest,
        request_id: Option<&str>,
    ) -> Result<FetchResponse, RequestError> {
        match self.store.fetch(&request.key).await {
            Ok(lock) => Ok(FetchResponse {
                resource: lock.resource,
            }),
            Err(err @ StoreError::ResourceNotFound) => {
                debug!(key = %request.key, "no held lease for key");
                Err(err.into())
            }
            Err(err) => {
                error!(
                    request_id = request_id.unwrap_or_default(),
                    key = %request.key,
                    error = %err,
                    "failed to fetch lock"
                );
                Err(err.into())
            }
        }
    }

    async fn do_fetch_all(
        &self,
        request: &FetchAllRequest,
        request_id: Option<&str>,
    ) -> Result<FetchAllResponse, RequestError> {
        let filter = match request.type_code {
            Some(TypeCode::Unknown) => {
                debug!("rejected fetch-all with explicit unknown type code");
                return Err(RequestError::InvalidType);
            }
            Some(code) => Some(code.name().to_owned()),
            // Older callers filter via the string field; an empty request
            // means every held lease.
            None if request.type_name.is_empty() => None,
            None => Some(request.type_name.clone()),
        };

        match self.store.fetch_all(filter.as_deref()).await {
            Ok(locks) => Ok(FetchAllResponse {
                resources: locks.into_iter().map(|lock| lock.resource).collect(),
            }),
            Err(err) => {
                error!(
                    request_id = request_id.unwrap_or_default(),
                    error = %err,
                    "failed to fetch locks"
                );
                Err(err.into())
            }
        }
    }
}

/// Accounting guard for one in-flight request.
struct RequestMonitor {
    metrics: Arc<RequestMetrics>,
    kind: RequestKind,
    start: Instant,
    request_id: Option<String>,
    key: String,
    owner: String,
    completed: bool,
}

impl Drop for RequestMonitor {
    fn drop(&mut self) {
        self.metrics.decrement_in_flight(self.kind);
        self.metrics.update_latency(self.kind, self.start.elapsed());
        if !self.completed {
            self.metrics.increment_cancelled(self.kind);
            info!(
                request_id = self.request_id.as_deref().unwrap_or_default(),
                request_type = self.kind.as_str(),
                resource_key = %self.key,
                resource_owner = %self.owner,
                "request cancelled before completion"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;

    use latch_core::{Lock, Resource};
    use latch_store_memory::MemoryLockStore;

    fn handler_with(store: Arc<dyn LockStore>) -> (Arc<LockHandler>, mpsc::Receiver<()>) {
        let (exit_tx, exit_rx) = mpsc::channel(1);
        let scheduler = TtlScheduler::new(Arc::clone(&store));
        let handler = LockHandler::new(
            store,
            scheduler,
            Arc::new(RequestMetrics::default()),
            exit_tx,
        );
        (Arc::new(handler), exit_rx)
    }

    fn memory_handler() -> (Arc<LockHandler>, mpsc::Receiver<()>) {
        handler_with(Arc::new(MemoryLockStore::new()))
    }

    fn lock_request(key: &str, owner: &str, ttl: i64) -> LockRequest {
        LockRequest {
            resource: Resource::new(key, owner, "payload", TypeCode::Lock),
            ttl_in_seconds: ttl,
        }
    }

    #[tokio::test]
    async fn lock_then_fetch_roundtrip() {
        let (handler, _exit) = memory_handler();
        let request = lock_request("k", "o1", 10);

        handler.lock(&request, None).await.unwrap();

        let fetched = handler
            .fetch(&FetchRequest { key: "k".into() }, None)
            .await
            .unwrap();
        assert_eq!(fetched.resource, request.resource);
    }

    #[tokio::test]
    async fn lock_validation_rules() {
        let (handler, _exit) = memory_handler();

        let err = handler.lock(&lock_request("k", "o1", 0), None).await;
        assert!(matches!(err, Err(RequestError::InvalidTtl)));

        let err = handler.lock(&lock_request("k", "o1", -3), None).await;
        assert!(matches!(err, Err(RequestError::InvalidTtl)));

        let err = handler.lock(&lock_request("k", "", 10), None).await;
        assert!(matches!(err, Err(RequestError::InvalidOwner)));

        let untyped = LockRequest {
            resource: Resource::new("k", "o1", "v", TypeCode::Unknown),
            ttl_in_seconds: 10,
        };
        let err = handler.lock(&untyped, None).await;
        assert!(matches!(err, Err(RequestError::InvalidType)));

        // Nothing was persisted by the rejected requests.
        let err = handler.fetch(&FetchRequest { key: "k".into() }, None).await;
        assert!(matches!(
            err,
            Err(RequestError::Store(StoreError::ResourceNotFound))
        ));
    }

    #[tokio::test]
    async fn legacy_type_string_is_accepted() {
        let (handler, _exit) = memory_handler();

        let request = LockRequest {
            resource: Resource {
                key: "k".into(),
                owner: "o1".into(),
                value: "v".into(),
                type_name: "presence".into(),
                type_code: TypeCode::Unknown,
            },
            ttl_in_seconds: 10,
        };
        handler.lock(&request, None).await.unwrap();

        let fetched = handler
            .fetch(&FetchRequest { key: "k".into() }, None)
            .await
            .unwrap();
        assert_eq!(fetched.resource.type_code, TypeCode::Presence);
    }

    #[tokio::test]
    async fn collision_counts_as_succeeded() {
        let (handler, _exit) = memory_handler();

        handler.lock(&lock_request("k", "o1", 10), None).await.unwrap();
        let err = handler.lock(&lock_request("k", "o2", 10), None).await;
        assert!(matches!(
            err,
            Err(RequestError::Store(StoreError::LockCollision))
        ));

        let snap = handler.metrics().snapshot();
        assert_eq!(snap.lock.started, 2);
        assert_eq!(snap.lock.succeeded, 2);
        assert_eq!(snap.lock.failed, 0);
        assert_eq!(snap.lock.in_flight, 0);
    }

    #[tokio::test]
    async fn release_authorization() {
        let (handler, _exit) = memory_handler();

        handler.lock(&lock_request("k", "o1", 10), None).await.unwrap();

        let intruder = ReleaseRequest {
            resource: Resource::new("k", "o2", "", TypeCode::Lock),
        };
        let err = handler.release(&intruder, None).await;
        assert!(matches!(
            err,
            Err(RequestError::Store(StoreError::LockCollision))
        ));

        let owner = ReleaseRequest {
            resource: Resource::new("k", "o1", "", TypeCode::Lock),
        };
        handler.release(&owner, None).await.unwrap();

        let err = handler.release(&owner, None).await;
        assert!(matches!(
            err,
            Err(RequestError::Store(StoreError::ResourceNotFound))
        ));
    }

    #[tokio::test]
    async fn fetch_all_filters() {
        let (handler, _exit) = memory_handler();

        for (key, owner, code) in [
            ("a", "o1", TypeCode::Lock),
            ("b", "o2", TypeCode::Presence),
            ("c", "o3", TypeCode::Lock),
        ] {
            let request = LockRequest {
                resource: Resource::new(key, owner, "v", code),
                ttl_in_seconds: 10,
            };
            handler.lock(&request, None).await.unwrap();
        }

        let keys = |response: FetchAllResponse| {
            let mut keys: Vec<String> = response
                .resources
                .into_iter()
                .map(|resource| resource.key)
                .collect();
            keys.sort();
            keys
        };

        let all = handler
            .fetch_all(&FetchAllRequest::default(), None)
            .await
            .unwrap();
        assert_eq!(keys(all), vec!["a", "b", "c"]);

        let locks = handler
            .fetch_all(
                &FetchAllRequest {
                    type_name: String::new(),
                    type_code: Some(TypeCode::Lock),
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(keys(locks), vec!["a", "c"]);

        let legacy = handler
            .fetch_all(
                &FetchAllRequest {
                    type_name: "presence".into(),
                    type_code: None,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(keys(legacy), vec!["b"]);

        let err = handler
            .fetch_all(
                &FetchAllRequest {
                    type_name: String::new(),
                    type_code: Some(TypeCode::Unknown),
                },
                None,
            )
            .await;
        assert!(matches!(err, Err(RequestError::InvalidType)));
    }

    #[tokio::test(start_paused = true)]
    async fn unrenewed_lease_expires_through_the_handler() {
        let (handler, _exit) = memory_handler();

        handler.lock(&lock_request("k", "o1", 1), None).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        let err = handler.fetch(&FetchRequest { key: "k".into() }, None).await;
        assert!(matches!(
            err,
            Err(RequestError::Store(StoreError::ResourceNotFound))
        ));
        assert_eq!(handler.expiration_metrics().snapshot().locks_expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_extends_the_lease() {
        let (handler, _exit) = memory_handler();

        handler.lock(&lock_request("k", "o1", 10), None).await.unwrap();
        tokio::time::sleep(Duration::from_secs(8)).await;
        handler.lock(&lock_request("k", "o1", 10), None).await.unwrap();

        // Past the original deadline, within the renewed one.
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(
            handler
                .fetch(&FetchRequest { key: "k".into() }, None)
                .await
                .is_ok()
        );

        tokio::time::sleep(Duration::from_secs(3)).await;
        tokio::task::yield_now().await;
        let err = handler.fetch(&FetchRequest { key: "k".into() }, None).await;
        assert!(matches!(
            err,
            Err(RequestError::Store(StoreError::ResourceNotFound))
        ));
    }

    /// Store stub that fails every call with an unrecoverable error.
    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl LockStore for BrokenStore {
        async fn lock(&self, _: &Resource, _: i64) -> Result<Lock, StoreError> {
            Err(StoreError::Unrecoverable("schema gone".into()))
        }
        async fn release(&self, _: &Resource) -> Result<(), StoreError> {
            Err(StoreError::Unrecoverable("schema gone".into()))
        }
        async fn fetch(&self, _: &str) -> Result<Lock, StoreError> {
            Err(StoreError::Unrecoverable("schema gone".into()))
        }
        async fn fetch_all(&self, _: Option<&str>) -> Result<Vec<Lock>, StoreError> {
            Err(StoreError::Unrecoverable("schema gone".into()))
        }
        async fn count(&self, _: Option<&str>) -> Result<u64, StoreError> {
            Err(StoreError::Unrecoverable("schema gone".into()))
        }
        async fn fetch_and_release(&self, _: &Lock) -> Result<bool, StoreError> {
            Err(StoreError::Unrecoverable("schema gone".into()))
        }
    }

    #[tokio::test]
    async fn unrecoverable_error_posts_exit_signal_once() {
        let (handler, mut exit_rx) = handler_with(Arc::new(BrokenStore));

        let err = handler.lock(&lock_request("k", "o1", 10), None).await;
        assert!(err.as_ref().is_err_and(RequestError::is_unrecoverable));

        // A second fault while the first signal is pending is absorbed.
        let _ = handler.lock(&lock_request("k", "o1", 10), None).await;

        assert!(exit_rx.try_recv().is_ok());
        assert!(exit_rx.try_recv().is_err());

        let snap = handler.metrics().snapshot();
        assert_eq!(snap.lock.failed, 2);
    }

    /// Store stub whose calls never complete.
    #[derive(Debug)]
    struct StalledStore;

    #[async_trait]
    impl LockStore for StalledStore {
        async fn lock(&self, _: &Resource, _: i64) -> Result<Lock, StoreError> {
            std::future::pending().await
        }
        async fn release(&self, _: &Resource) -> Result<(), StoreError> {
            std::future::pending().await
        }
        async fn fetch(&self, _: &str) -> Result<Lock, StoreError> {
            std::future::pending().await
        }
        async fn fetch_all(&self, _: Option<&str>) -> Result<Vec<Lock>, StoreError> {
            std::future::pending().await
        }
        async fn count(&self, _: Option<&str>) -> Result<u64, StoreError> {
            std::future::pending().await
        }
        async fn fetch_and_release(&self, _: &Lock) -> Result<bool, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn dropped_request_is_metered_as_cancelled() {
        let (handler, _exit) = handler_with(Arc::new(StalledStore));

        let task = tokio::spawn({
            let handler = Arc::clone(&handler);
            async move {
                handler
                    .lock(&lock_request("k", "o1", 10), Some("req-42"))
                    .await
            }
        });

        // Let the request enter the store call, then drop it the way the
        // transport does when a client disconnects.
        tokio::task::yield_now().await;
        task.abort();
        let _ = task.await;

        let snap = handler.metrics().snapshot();
        assert_eq!(snap.lock.started, 1);
        assert_eq!(snap.lock.cancelled, 1);
        assert_eq!(snap.lock.in_flight, 0);
        assert_eq!(snap.lock.succeeded, 0);
        assert_eq!(snap.lock.failed, 0);
    }
}
