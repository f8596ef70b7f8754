use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// The four registry operations, used to key request metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Lock,
    Release,
    Fetch,
    FetchAll,
}

impl RequestKind {
    pub const ALL: [RequestKind; 4] = [Self::Lock, Self::Release, Self::Fetch, Self::FetchAll];

    /// Stable name used in log lines and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Release => "release",
            Self::Fetch => "fetch",
            Self::FetchAll => "fetch_all",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Lock => 0,
            Self::Release => 1,
            Self::Fetch => 2,
            Self::FetchAll => 3,
        }
    }
}

/// Counters for one request kind. Relaxed ordering throughout; the
/// consistency of a cross-counter view is not needed.
#[derive(Debug, Default)]
struct KindCounters {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    in_flight: AtomicU64,
    max_latency_ns: AtomicU64,
}

/// Per-operation request accounting: started / succeeded / failed /
/// cancelled / in-flight counts and a max-latency watermark.
///
/// Collisions count as succeeded; they are expected business outcomes,
/// not faults.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    kinds: [KindCounters; 4],
}

impl RequestMetrics {
    fn counters(&self, kind: RequestKind) -> &KindCounters {
        &self.kinds[kind.index()]
    }

    pub fn increment_started(&self, kind: RequestKind) {
        self.counters(kind).started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_succeeded(&self, kind: RequestKind) {
        self.counters(kind)
            .succeeded
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self, kind: RequestKind) {
        self.counters(kind).failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cancelled(&self, kind: RequestKind) {
        self.counters(kind)
            .cancelled
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_in_flight(&self, kind: RequestKind) {
        self.counters(kind)
            .in_flight
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_in_flight(&self, kind: RequestKind) {
        self.counters(kind)
            .in_flight
            .fetch_sub(1, Ordering::Relaxed);
    }

    /// Raise the max-latency watermark if `latency` exceeds it.
    pub fn update_latency(&self, kind: RequestKind, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.counters(kind)
            .max_latency_ns
            .fetch_max(nanos, Ordering::Relaxed);
    }

    /// Read the max-latency watermark and reset it to zero. Used by the
    /// periodic reporter so each interval reports its own maximum.
    pub fn read_and_reset_max_latency(&self, kind: RequestKind) -> Duration {
        let nanos = self
            .counters(kind)
            .max_latency_ns
            .swap(0, Ordering::Relaxed);
        Duration::from_nanos(nanos)
    }

    /// Take a point-in-time snapshot of one kind's counters.
    pub fn snapshot_kind(&self, kind: RequestKind) -> RequestKindSnapshot {
        let counters = self.counters(kind);
        RequestKindSnapshot {
            started: counters.started.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            cancelled: counters.cancelled.load(Ordering::Relaxed),
            in_flight: counters.in_flight.load(Ordering::Relaxed),
            max_latency_ms: counters.max_latency_ns.load(Ordering::Relaxed) / 1_000_000,
        }
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> RequestMetricsSnapshot {
        RequestMetricsSnapshot {
            lock: self.snapshot_kind(RequestKind::Lock),
            release: self.snapshot_kind(RequestKind::Release),
            fetch: self.snapshot_kind(RequestKind::Fetch),
            fetch_all: self.snapshot_kind(RequestKind::FetchAll),
        }
    }
}

/// Plain data view of one request kind's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestKindSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub in_flight: u64,
    pub max_latency_ms: u64,
}

/// Plain data view of all request counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestMetricsSnapshot {
    pub lock: RequestKindSnapshot,
    pub release: RequestKindSnapshot,
    pub fetch: RequestKindSnapshot,
    pub fetch_all: RequestKindSnapshot,
}
