use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use latch_core::{LOCK_TYPE, PRESENCE_TYPE};

use super::AppState;

/// `GET /health` -- liveness probe.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"})))
}

/// `GET /metrics` -- request and expiration counters plus the number of
/// currently held leases per type.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let requests = state.handler.metrics().snapshot();
    let expirations = state.handler.expiration_metrics().snapshot();

    // Held counts come from the store; report null rather than failing
    // the whole endpoint when the database is unavailable.
    let locks_held = state.handler.held_count(Some(LOCK_TYPE)).await.ok();
    let presences_held = state.handler.held_count(Some(PRESENCE_TYPE)).await.ok();

    let body = serde_json::json!({
        "requests": requests,
        "expirations": {
            "locks_expired": expirations.locks_expired,
            "presences_expired": expirations.presences_expired,
        },
        "held": {
            "locks": locks_held,
            "presences": presences_held,
        }
    });

    (StatusCode::OK, Json(body))
}
