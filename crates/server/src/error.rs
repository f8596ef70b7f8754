use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use latch_store::StoreError;

/// Errors surfaced by the request handler.
///
/// Validation failures are handler-local; everything else comes from the
/// lock store. Each variant carries a stable wire code so clients can
/// match on outcomes without parsing messages.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("ttl must be positive")]
    InvalidTtl,

    #[error("owner must not be empty")]
    InvalidOwner,

    #[error("type must be a known type code")]
    InvalidType,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RequestError {
    /// Stable wire code for the error body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTtl => "invalid-ttl",
            Self::InvalidOwner => "invalid-owner",
            Self::InvalidType => "invalid-type",
            Self::Store(StoreError::LockCollision) => "lock-collision",
            Self::Store(StoreError::ResourceNotFound) => "resource-not-found",
            Self::Store(StoreError::Unrecoverable(_)) => "unrecoverable",
            Self::Store(StoreError::Backend(_)) => "unavailable",
        }
    }

    /// HTTP status this error maps to.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidTtl | Self::InvalidOwner | Self::InvalidType => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::LockCollision) => StatusCode::CONFLICT,
            Self::Store(StoreError::ResourceNotFound) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Unrecoverable(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Store(StoreError::Backend(_)) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether this is the expected lost-the-race outcome.
    #[must_use]
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::Store(StoreError::LockCollision))
    }

    /// Whether this error should trip the process exit signal.
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_unrecoverable())
    }
}

/// JSON error body: `{"error": <message>, "code": <stable-code>}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_owned(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Errors that can occur when running the Latch server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener, reading PEM files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A TLS setup error.
    #[error("tls error: {0}")]
    Tls(String),

    /// A store error surfaced during startup.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(RequestError::InvalidTtl.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            RequestError::Store(StoreError::LockCollision).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RequestError::Store(StoreError::ResourceNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RequestError::Store(StoreError::Unrecoverable("gone".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RequestError::Store(StoreError::Backend("busy".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn collision_is_not_unrecoverable() {
        let err = RequestError::Store(StoreError::LockCollision);
        assert!(err.is_collision());
        assert!(!err.is_unrecoverable());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(RequestError::InvalidOwner.code(), "invalid-owner");
        assert_eq!(
            RequestError::Store(StoreError::ResourceNotFound).code(),
            "resource-not-found"
        );
    }
}
