//! Centralized error types for Tasksync.

use thiserror::Error;

/// Main error type for task operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] tasksync_redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for task operations.
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Whether the error is the caller's fault rather than the server's.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::TaskNotFound(_) | Self::ValidationError(_))
    }
}
