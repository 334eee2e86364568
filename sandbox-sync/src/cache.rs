//! In-memory content cache.
//!
//! The cache is the fast path for current content: every edit lands here
//! synchronously, while the durable store catches up after the debounce
//! window. Entries are kept in insertion order (hydrated ids in durable
//! order, then ids registered this session), which is also the order used
//! for display ordinals.

use crate::error::SyncResult;
use indexmap::IndexMap;
use sandbox_storage::PersistenceStore;
use sandbox_types::{now_ms, GroupId, SandboxRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Map of group id to current record.
#[derive(Debug, Default)]
pub struct SandboxCache {
    entries: RwLock<IndexMap<GroupId, SandboxRecord>>,
    hydrated: AtomicBool,
}

impl SandboxCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<GroupId, SandboxRecord>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<GroupId, SandboxRecord>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates an empty entry for `id` unless one exists.
    /// Returns true if the entry was created.
    pub fn register(&self, id: &GroupId) -> bool {
        let mut entries = self.write();
        if entries.contains_key(id) {
            return false;
        }
        entries.insert(id.clone(), SandboxRecord::empty(id.clone()));
        debug!("Registered sandbox {}", id);
        true
    }

    /// Replaces the content of a registered entry and bumps its `mtime`.
    ///
    /// Returns the new `mtime`, or `None` (and changes nothing) if `id` is
    /// not registered. The `mtime` never moves backwards, even if the wall
    /// clock does.
    pub fn update(&self, id: &GroupId, content: impl Into<String>) -> Option<u64> {
        let mut entries = self.write();
        let entry = entries.get_mut(id)?;
        entry.content = content.into();
        entry.mtime = now_ms().max(entry.mtime);
        Some(entry.mtime)
    }

    /// Returns a copy of the entry for `id`.
    pub fn get(&self, id: &GroupId) -> Option<SandboxRecord> {
        self.read().get(id).cloned()
    }

    /// Returns copies of every entry in insertion order.
    pub fn get_all(&self) -> Vec<SandboxRecord> {
        self.read().values().cloned().collect()
    }

    /// Removes the entry for `id` from the cache only.
    pub fn delete(&self, id: &GroupId) -> Option<SandboxRecord> {
        self.write().shift_remove(id)
    }

    /// Returns true if `id` has an entry.
    pub fn contains(&self, id: &GroupId) -> bool {
        self.read().contains_key(id)
    }

    /// Returns the 0-based insertion position of `id`.
    pub fn position(&self, id: &GroupId) -> Option<usize> {
        self.read().get_index_of(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Loads every durable record into the cache.
    ///
    /// Runs once; later calls return `Ok(0)`. Entries registered before
    /// hydration are left untouched. Returns the number of entries loaded.
    pub async fn hydrate(&self, store: &PersistenceStore) -> SyncResult<usize> {
        if self.hydrated.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }
        let records = match store.get_all().await {
            Ok(records) => records,
            Err(e) => {
                self.hydrated.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        // Durable order first; an entry registered before hydration keeps
        // its content but takes its durable position if it has one.
        let mut entries = self.write();
        let mut merged = IndexMap::with_capacity(records.len() + entries.len());
        let mut loaded = 0;
        for record in records {
            match entries.shift_remove(&record.id) {
                Some(existing) => merged.insert(record.id.clone(), existing),
                None => {
                    loaded += 1;
                    merged.insert(record.id.clone(), record)
                }
            };
        }
        merged.extend(entries.drain(..));
        *entries = merged;

        info!("Hydrated {} sandbox(es) from durable storage", loaded);
        Ok(loaded)
    }

    /// Returns true once [`hydrate`](Self::hydrate) has succeeded.
    pub fn is_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::SeqCst)
    }
}
