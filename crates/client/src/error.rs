//! Error types for the Latch client.

use thiserror::Error;

/// Errors that can occur when using the Latch client.
#[derive(Debug, Error)]
pub enum Error {
    /// The key is held by another owner.
    #[error("lock is held by another owner")]
    Collision,

    /// No held lease exists for the requested key.
    #[error("no held lease for the requested key")]
    NotFound,

    /// The server rejected the request as invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A server-side failure.
    #[error("server error (HTTP {status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message from the server, if any.
        message: String,
    },

    /// Connection error (network failure, DNS resolution, timeout).
    #[error("connection error: {0}")]
    Connection(String),

    /// Response deserialization error.
    #[error("failed to deserialize response: {0}")]
    Deserialization(String),

    /// Client configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Returns `true` if retrying the request may succeed.
    ///
    /// Connection errors and 5xx server errors are retryable; the
    /// registry's lock semantics make blind retry of a `Lock` call safe
    /// because a renewal by the same owner is idempotent in outcome.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Collision
            | Self::NotFound
            | Self::InvalidRequest(_)
            | Self::Deserialization(_)
            | Self::Configuration(_) => false,
        }
    }

    /// Returns `true` if the lock was held by another owner.
    #[must_use]
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::Collision)
    }

    /// Returns `true` if the requested key had no held lease.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Map an error response's status and wire code to a typed error.
    pub(crate) fn from_response_parts(status: u16, code: Option<&str>, message: String) -> Self {
        match code {
            Some("lock-collision") => Self::Collision,
            Some("resource-not-found") => Self::NotFound,
            Some("invalid-ttl" | "invalid-owner" | "invalid-type") => Self::InvalidRequest(message),
            _ => Self::Server { status, message },
        }
    }
}
