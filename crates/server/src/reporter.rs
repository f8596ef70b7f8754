use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use latch_core::{LOCK_TYPE, PRESENCE_TYPE};

use crate::handler::LockHandler;
use crate::metrics::RequestKind;

/// Spawn the periodic metrics reporter.
///
/// Every `interval` it logs the request counters per operation (with the
/// interval's max latency, which resets on read), the expiration
/// counters, and the number of currently held locks and presences.
///
/// Returns a `JoinHandle` that can be aborted to stop reporting.
pub fn spawn_reporter(handler: Arc<LockHandler>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the first report
        // covers a full interval.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            debug!("emitting metrics");

            for kind in RequestKind::ALL {
                let snap = handler.metrics().snapshot_kind(kind);
                let max_latency = handler.metrics().read_and_reset_max_latency(kind);
                info!(
                    request_type = kind.as_str(),
                    started = snap.started,
                    succeeded = snap.succeeded,
                    failed = snap.failed,
                    cancelled = snap.cancelled,
                    in_flight = snap.in_flight,
                    max_latency_ms = u64::try_from(max_latency.as_millis()).unwrap_or(u64::MAX),
                    "request metrics"
                );
            }

            let expirations = handler.expiration_metrics().snapshot();
            info!(
                locks_expired = expirations.locks_expired,
                presences_expired = expirations.presences_expired,
                "expiration metrics"
            );

            match handler.held_count(Some(LOCK_TYPE)).await {
                Ok(count) => info!(locks_held = count, "held locks"),
                Err(err) => warn!(error = %err, "failed to count held locks"),
            }
            match handler.held_count(Some(PRESENCE_TYPE)).await {
                Ok(count) => info!(presences_held = count, "held presences"),
                Err(err) => warn!(error = %err, "failed to count held presences"),
            }
        }
    })
}
