//! Error types for the sync layer.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Durable storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] sandbox_storage::StorageError),

    /// Settings could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// A group id or view handle was not valid.
    #[error("invalid id: {0}")]
    InvalidId(#[from] sandbox_types::Error),

    /// The orchestrator loop is gone.
    #[error("channel closed")]
    ChannelClosed,
}
