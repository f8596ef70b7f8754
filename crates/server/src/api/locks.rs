use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;

use latch_core::{
    FetchAllRequest, FetchAllResponse, FetchRequest, FetchResponse, LockRequest, ReleaseRequest,
};

use crate::error::RequestError;

use super::{AppState, request_id};

/// `POST /v1/lock` -- acquire or renew a lease.
///
/// Returns an empty object on success; a lease held by another owner maps
/// to `409 Conflict`.
pub async fn lock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LockRequest>,
) -> Result<Json<serde_json::Value>, RequestError> {
    let request_id = request_id(&headers);
    state.handler.lock(&request, request_id.as_deref()).await?;
    Ok(Json(serde_json::json!({})))
}

/// `POST /v1/release` -- release a held lease.
pub async fn release(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReleaseRequest>,
) -> Result<Json<serde_json::Value>, RequestError> {
    let request_id = request_id(&headers);
    state
        .handler
        .release(&request, request_id.as_deref())
        .await?;
    Ok(Json(serde_json::json!({})))
}

/// `POST /v1/fetch` -- read the currently held lease for a key.
pub async fn fetch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FetchRequest>,
) -> Result<Json<FetchResponse>, RequestError> {
    let request_id = request_id(&headers);
    let response = state.handler.fetch(&request, request_id.as_deref()).await?;
    Ok(Json(response))
}

/// `POST /v1/fetch_all` -- list held leases, optionally filtered by type.
pub async fn fetch_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FetchAllRequest>,
) -> Result<Json<FetchAllResponse>, RequestError> {
    let request_id = request_id(&headers);
    let response = state
        .handler
        .fetch_all(&request, request_id.as_deref())
        .await?;
    Ok(Json(response))
}
