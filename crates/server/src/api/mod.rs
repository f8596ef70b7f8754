pub mod health;
pub mod locks;

use std::sync::Arc;

use axum::Router;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handler::LockHandler;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The request handler.
    pub handler: Arc<LockHandler>,
}

/// Build the axum router with all API routes and middleware.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health & metrics
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        // Registry operations
        .route("/v1/lock", post(locks::lock))
        .route("/v1/release", post(locks::release))
        .route("/v1/fetch", post(locks::fetch))
        .route("/v1/fetch_all", post(locks::fetch_all))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Request id carried in transport metadata, preserved in log lines.
pub(crate) fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
