//! Core type definitions for sandbox documents.
//!
//! This crate defines the plain data shared by every layer of the engine:
//! - Group identifiers (the id shared by every view of one sandbox)
//! - View handles (one per open view)
//! - The sandbox record, its JSON wire form and the structural validation
//!   applied on every durable read
//! - Millisecond clock helpers used for `mtime` and retention arithmetic
//!
//! Nothing here performs I/O.

mod ids;
mod record;
mod timestamp;

pub use ids::{GroupId, ViewHandle};
pub use record::{RecordError, SandboxRecord, SCHEMA_VERSION};
pub use timestamp::{days_to_ms, is_expired, now_ms, MILLIS_PER_DAY};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("group id must not be empty")]
    EmptyId,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),
}
