//! Durable engine boundary.
//!
//! A backend stores opaque JSON values by id. It performs no validation:
//! whatever was put comes back out, malformed or not.

use crate::error::{StorageError, StorageResult};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A key/value engine holding opaque sandbox records.
///
/// Implementations are synchronous; [`crate::PersistenceStore`] calls them on
/// the blocking pool.
pub trait RecordBackend: Send + Sync {
    /// Returns the stored value for `id`, if any.
    fn get(&self, id: &str) -> StorageResult<Option<Value>>;

    /// Inserts or replaces the value for `id`.
    fn put(&self, id: &str, value: &Value) -> StorageResult<()>;

    /// Removes the value for `id`. Returns true if something was removed.
    fn delete(&self, id: &str) -> StorageResult<bool>;

    /// Returns every stored value in first-insertion order.
    fn get_all(&self) -> StorageResult<Vec<(String, Value)>>;

    /// Returns the number of stored values.
    fn count(&self) -> StorageResult<usize>;
}

/// In-memory backend preserving insertion order.
///
/// Writes can be switched to fail, which lets tests exercise the
/// "durable write failed, keep the in-memory edit" path.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<IndexMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `put`/`delete` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("writes disabled".into()));
        }
        Ok(())
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, IndexMap<String, Value>>> {
        self.records
            .lock()
            .map_err(|_| StorageError::Backend("memory backend lock poisoned".into()))
    }
}

impl RecordBackend for MemoryBackend {
    fn get(&self, id: &str) -> StorageResult<Option<Value>> {
        Ok(self.lock()?.get(id).cloned())
    }

    fn put(&self, id: &str, value: &Value) -> StorageResult<()> {
        self.check_writable()?;
        // `insert` on an existing key keeps its position.
        self.lock()?.insert(id.to_owned(), value.clone());
        Ok(())
    }

    fn delete(&self, id: &str) -> StorageResult<bool> {
        self.check_writable()?;
        Ok(self.lock()?.shift_remove(id).is_some())
    }

    fn get_all(&self) -> StorageResult<Vec<(String, Value)>> {
        Ok(self
            .lock()?
            .iter()
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect())
    }

    fn count(&self) -> StorageResult<usize> {
        Ok(self.lock()?.len())
    }
}
