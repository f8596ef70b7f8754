use thiserror::Error;

/// Errors from lock store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is held by a different owner.
    #[error("lock-collision")]
    LockCollision,

    /// No held lease exists for the key (missing or vacant row).
    #[error("resource-not-found")]
    ResourceNotFound,

    /// The store cannot make progress without a restart (closed pool,
    /// missing schema). Surfacing one of these trips the process exit
    /// signal.
    #[error("unrecoverable storage error: {0}")]
    Unrecoverable(String),

    /// A transient storage fault; the caller may retry.
    #[error("storage error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error means the server should shut down.
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }
}
