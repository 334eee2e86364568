//! Durable storage layer for sandbox documents.
//!
//! Wraps an opaque key/value record engine with the rules the rest of the
//! engine relies on:
//!
//! - Every read is structurally validated; malformed records read as absent
//! - Writes are debounced per id, one timer per id, latest content wins
//! - Writes and deletes for one id are applied in issue order, so a late
//!   write can never overwrite a newer one or resurrect a deleted record
//! - Expired records are swept after a retention window, re-checking group
//!   activity right before each deletion
//!
//! # Architecture
//!
//! - [`RecordBackend`] is the boundary to the durable engine. It stores
//!   `serde_json::Value`s keyed by id and knows nothing about sandboxes.
//! - [`SqliteBackend`] is the production engine; [`MemoryBackend`] backs tests.
//! - [`PersistenceStore`] owns a backend and runs its calls on the blocking
//!   pool.

mod backend;
mod debounce;
mod error;
mod sqlite;
mod store;

pub use backend::{MemoryBackend, RecordBackend};
pub use error::{StorageError, StorageResult};
pub use sqlite::SqliteBackend;
pub use store::{PersistenceStore, SweepReport};
