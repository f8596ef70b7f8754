use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for leases reclaimed by TTL expiry, split by lease type.
///
/// Counters use relaxed ordering; call [`snapshot`](Self::snapshot) for a
/// point-in-time view.
#[derive(Debug, Default)]
pub struct ExpirationMetrics {
    /// Exclusive locks released by expiry.
    pub locks_expired: AtomicU64,
    /// Presences released by expiry.
    pub presences_expired: AtomicU64,
}

impl ExpirationMetrics {
    /// Increment the expired-locks counter.
    pub fn increment_locks_expired(&self) {
        self.locks_expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the expired-presences counter.
    pub fn increment_presences_expired(&self) {
        self.presences_expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of both counters.
    pub fn snapshot(&self) -> ExpirationSnapshot {
        ExpirationSnapshot {
            locks_expired: self.locks_expired.load(Ordering::Relaxed),
            presences_expired: self.presences_expired.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`ExpirationMetrics`] at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpirationSnapshot {
    pub locks_expired: u64,
    pub presences_expired: u64,
}
