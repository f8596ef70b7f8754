//! TTL enforcement for granted leases.
//!
//! The server process, not the database, is the authority for lease
//! liveness: every granted or renewed lease gets one in-memory watcher
//! that releases it when the TTL elapses, unless a renewal superseded the
//! watcher's lease generation in the meantime.

pub mod metrics;
mod scheduler;

pub use metrics::{ExpirationMetrics, ExpirationSnapshot};
pub use scheduler::TtlScheduler;
