//! Validated, ordered persistence over a [`RecordBackend`].

use crate::backend::RecordBackend;
use crate::debounce::{Debouncer, Trigger};
use crate::error::{StorageError, StorageResult};
use crate::sqlite::SqliteBackend;
use sandbox_types::{is_expired, now_ms, GroupId, SandboxRecord};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a retention sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Valid records examined.
    pub scanned: usize,
    /// Records older than the threshold.
    pub expired: usize,
    /// Records actually deleted.
    pub deleted: Vec<GroupId>,
    /// Expired records kept because their group was active at deletion time.
    pub skipped_active: Vec<GroupId>,
}

enum Op {
    Put(Value),
    Delete,
}

type Gate = Arc<tokio::sync::Mutex<u64>>;

/// Per-id write gates holding the last applied sequence number.
///
/// A gate lives only while some operation for its id holds a [`GateClaim`].
/// Every claim is taken before its sequence number is issued, so when the
/// last claim goes away no lower-numbered operation for that id can still
/// arrive and the gate is dropped.
#[derive(Clone, Default)]
struct Gates(Arc<Mutex<HashMap<GroupId, Gate>>>);

impl Gates {
    fn lock(&self) -> MutexGuard<'_, HashMap<GroupId, Gate>> {
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn claim(&self, id: &GroupId) -> GateClaim {
        let gate = Arc::clone(self.lock().entry(id.clone()).or_default());
        GateClaim {
            gates: self.clone(),
            id: id.clone(),
            gate: Some(gate),
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// An outstanding operation's hold on its id's gate.
struct GateClaim {
    gates: Gates,
    id: GroupId,
    gate: Option<Gate>,
}

impl Drop for GateClaim {
    fn drop(&mut self) {
        let mut gates = self.gates.lock();
        // Released under the map lock so concurrent claims see exact counts.
        if let Some(gate) = self.gate.take() {
            let unclaimed = Arc::strong_count(&gate) == 2
                && gates.get(&self.id).is_some_and(|g| Arc::ptr_eq(g, &gate));
            drop(gate);
            if unclaimed {
                gates.remove(&self.id);
            }
        }
    }
}

/// State shared with debounce timer tasks.
struct Shared {
    backend: Arc<dyn RecordBackend>,
    gates: Gates,
}

impl Shared {
    async fn blocking<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&dyn RecordBackend) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || f(backend.as_ref()))
            .await
            .map_err(|e| StorageError::TaskJoin(e.to_string()))?
    }

    /// Applies `op` unless an operation issued later has already been
    /// applied for the same id. Returns false if the op was dropped as stale.
    async fn apply(&self, claim: GateClaim, seq: u64, op: Op) -> StorageResult<bool> {
        let Some(gate) = claim.gate.as_ref() else {
            return Ok(false);
        };
        let id = &claim.id;
        let mut last = gate.lock().await;
        if seq < *last {
            debug!("Dropping stale write #{} for {} (applied #{})", seq, id, *last);
            return Ok(false);
        }
        *last = seq;

        let key = id.as_str().to_owned();
        match op {
            Op::Put(value) => self.blocking(move |b| b.put(&key, &value)).await?,
            Op::Delete => {
                self.blocking(move |b| b.delete(&key)).await?;
            }
        }
        Ok(true)
    }

    async fn write_content(&self, claim: GateClaim, seq: u64, content: String) -> StorageResult<bool> {
        let record = SandboxRecord::new(claim.id.clone(), content, now_ms());
        self.apply(claim, seq, Op::Put(record.to_value())).await
    }
}

/// Durable sandbox store.
///
/// Reads are validated: a stored value that is not a well-formed record is
/// reported as absent and logged, never returned. Writes for one id are
/// applied in the order they were issued.
pub struct PersistenceStore {
    shared: Arc<Shared>,
    debouncer: Debouncer,
}

impl PersistenceStore {
    /// Wraps an existing backend.
    pub fn new(backend: Arc<dyn RecordBackend>) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                gates: Gates::default(),
            }),
            debouncer: Debouncer::new(),
        }
    }

    /// Opens (or creates) a SQLite-backed store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Ok(Self::new(Arc::new(SqliteBackend::open(path)?)))
    }

    /// Opens an in-memory SQLite-backed store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Ok(Self::new(Arc::new(SqliteBackend::open_in_memory()?)))
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Returns the record for `id`, or `None` if absent or malformed.
    pub async fn get(&self, id: &GroupId) -> StorageResult<Option<SandboxRecord>> {
        let key = id.as_str().to_owned();
        let value = self.shared.blocking(move |b| b.get(&key)).await?;
        Ok(value.and_then(|v| validate(id.as_str(), &v)))
    }

    /// Returns every valid record in first-insertion order.
    /// Malformed records are skipped.
    pub async fn get_all(&self) -> StorageResult<Vec<SandboxRecord>> {
        let rows = self.shared.blocking(|b| b.get_all()).await?;
        Ok(rows
            .iter()
            .filter_map(|(key, value)| validate(key, value))
            .collect())
    }

    /// Returns the number of stored values, valid or not.
    pub async fn count(&self) -> StorageResult<usize> {
        self.shared.blocking(|b| b.count()).await
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Upserts a record immediately, superseding any pending debounced write.
    pub async fn put(&self, record: &SandboxRecord) -> StorageResult<()> {
        let claim = self.shared.gates.claim(&record.id);
        let (seq, _) = self.debouncer.cancel_and_sequence(&record.id);
        self.shared
            .apply(claim, seq, Op::Put(record.to_value()))
            .await?;
        Ok(())
    }

    /// Writes `content` for `id` immediately, bypassing the debounce window.
    /// A pending debounced write for `id` is discarded.
    pub async fn force_write(&self, id: &GroupId, content: impl Into<String>) -> StorageResult<()> {
        let claim = self.shared.gates.claim(id);
        let (seq, _) = self.debouncer.cancel_and_sequence(id);
        self.shared.write_content(claim, seq, content.into()).await?;
        Ok(())
    }

    /// Removes the durable record for `id` and cancels its pending write.
    ///
    /// The cancel happens before this call first yields, and any write issued
    /// earlier for `id` is dropped if it reaches the store afterwards.
    /// Deleting an absent id is a no-op.
    pub async fn delete(&self, id: &GroupId) -> StorageResult<()> {
        let claim = self.shared.gates.claim(id);
        let (seq, cancelled) = self.debouncer.cancel_and_sequence(id);
        if cancelled {
            debug!("Cancelled pending write for {}", id);
        }
        self.shared.apply(claim, seq, Op::Delete).await?;
        Ok(())
    }

    /// Schedules a debounced write of `content` for `id`.
    ///
    /// The first call in a quiet period writes right away; calls within
    /// `delay` of the previous one collapse into a single trailing write of
    /// the latest content. Failures are logged, not returned.
    ///
    /// Must be called from within a tokio runtime.
    pub fn debounced_write(&self, id: &GroupId, content: impl Into<String>, delay: Duration) {
        let content = content.into();
        let leading_claim = self.shared.gates.claim(id);
        let trailing_claim = self.shared.gates.claim(id);
        let shared = Arc::clone(&self.shared);
        let trigger = self.debouncer.trigger(id, content.clone(), delay, move |seq, content| {
            async move {
                let id = trailing_claim.id.clone();
                if let Err(e) = shared.write_content(trailing_claim, seq, content).await {
                    warn!("Debounced write for {} failed: {}", id, e);
                }
            }
        });

        if let Trigger::Leading(seq) = trigger {
            let shared = Arc::clone(&self.shared);
            let id = id.clone();
            tokio::spawn(async move {
                if let Err(e) = shared.write_content(leading_claim, seq, content).await {
                    warn!("Write for {} failed: {}", id, e);
                }
            });
        }
    }

    /// Cancels the pending debounced write for `id`, if any.
    pub fn cancel_pending(&self, id: &GroupId) -> bool {
        self.debouncer.cancel(id)
    }

    /// Cancels every pending debounced write. Returns how many were pending.
    pub fn cancel_all(&self) -> usize {
        self.debouncer.cancel_all()
    }

    /// Returns true if `id` has an open debounce window.
    pub fn has_pending(&self, id: &GroupId) -> bool {
        self.debouncer.is_pending(id)
    }

    /// Returns the number of ids with an open debounce window.
    pub fn pending_count(&self) -> usize {
        self.debouncer.pending_count()
    }

    /// Returns the number of ids with a write or delete still in flight or
    /// scheduled.
    pub fn in_flight_count(&self) -> usize {
        self.shared.gates.len()
    }

    // ── Retention ────────────────────────────────────────────────

    /// Deletes every record older than `threshold_days` whose group is not
    /// active.
    ///
    /// `is_active` is consulted for each candidate immediately before it is
    /// deleted, after re-reading the record, so a group that reopened or was
    /// edited during the sweep is kept.
    pub async fn sweep_expired<F>(&self, threshold_days: u32, is_active: F) -> StorageResult<SweepReport>
    where
        F: Fn(&GroupId) -> bool,
    {
        let records = self.get_all().await?;
        let now = now_ms();
        let mut report = SweepReport {
            scanned: records.len(),
            ..SweepReport::default()
        };

        for record in records {
            if !is_expired(record.mtime, now, threshold_days) {
                continue;
            }
            report.expired += 1;

            let still_expired = match self.get(&record.id).await {
                Ok(Some(current)) => is_expired(current.mtime, now_ms(), threshold_days),
                Ok(None) => false,
                Err(e) => {
                    warn!("Sweep could not re-read {}: {}", record.id, e);
                    false
                }
            };
            if !still_expired {
                continue;
            }
            if is_active(&record.id) {
                debug!("Sweep kept {}: group is active", record.id);
                report.skipped_active.push(record.id);
                continue;
            }

            match self.delete(&record.id).await {
                Ok(()) => report.deleted.push(record.id),
                Err(e) => warn!("Sweep failed to delete {}: {}", record.id, e),
            }
        }

        info!(
            "Retention sweep: scanned {}, expired {}, deleted {}, kept active {}",
            report.scanned,
            report.expired,
            report.deleted.len(),
            report.skipped_active.len()
        );
        Ok(report)
    }
}

fn validate(key: &str, value: &Value) -> Option<SandboxRecord> {
    match SandboxRecord::from_value(value) {
        Ok(record) if record.id.as_str() == key => Some(record),
        Ok(record) => {
            warn!("Ignoring record stored under {} with id {}", key, record.id);
            None
        }
        Err(e) => {
            warn!("Ignoring malformed record {}: {}", key, e);
            None
        }
    }
}
