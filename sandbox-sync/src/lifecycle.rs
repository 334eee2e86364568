//! Close-time state machine and teardown flush.
//!
//! ```text
//! ACTIVE ──(non-last view closes)──────────────▶ ACTIVE
//! ACTIVE ──(last view closes)──────────────────▶ CLOSING_LAST
//! CLOSING_LAST ──(confirm: delete)─────────────▶ (forgotten)
//! CLOSING_LAST ──(confirm: keep, abortable)────▶ ACTIVE
//! CLOSING_LAST ──(confirm: keep / error)───────▶ RETAINED
//! ```
//!
//! Deleting removes the cache entry, cancels the pending debounced write and
//! removes the durable record, so nothing written earlier can bring the
//! sandbox back.

use crate::cache::SandboxCache;
use crate::confirm::CloseConfirmation;
use crate::coordinator::{Departure, SyncCoordinator};
use crate::error::SyncResult;
use sandbox_storage::{PersistenceStore, SweepReport};
use sandbox_types::{GroupId, ViewHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Where a group is in its close lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// At least one view is open.
    Active,
    /// The last view is closing and the user is being asked.
    ClosingLast,
    /// The last view closed and the record was kept.
    Retained,
}

/// What happened to a closing view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Other views remain; the view simply left its group.
    Detached,
    /// The user cancelled and the view stays open.
    KeptOpen,
    /// The sandbox was deleted.
    Deleted,
    /// The view closed and the sandbox was kept for the retention window.
    Retained,
    /// Another close of the same group is already waiting for confirmation.
    AlreadyClosing,
}

/// Result of the teardown flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records written.
    pub flushed: usize,
    /// Records whose write failed (logged).
    pub failed: usize,
}

/// How the last-view close decides.
#[derive(Debug, Clone)]
pub struct ClosePolicy {
    /// Ask before deleting. When false, closed sandboxes are retained.
    pub confirm_on_last_close: bool,
    /// Delete empty sandboxes without asking.
    pub delete_empty_without_confirm: bool,
    /// Retention shown to the user and used by the sweep.
    pub retention_days: u32,
}

impl Default for ClosePolicy {
    fn default() -> Self {
        Self {
            confirm_on_last_close: true,
            delete_empty_without_confirm: true,
            retention_days: 7,
        }
    }
}

enum Decision {
    Delete,
    Keep,
    Retain,
}

/// Runs the delete-or-retain decision when views close.
pub struct LifecycleController {
    cache: Arc<SandboxCache>,
    store: Arc<PersistenceStore>,
    coordinator: Arc<SyncCoordinator>,
    confirmation: Arc<dyn CloseConfirmation>,
    policy: ClosePolicy,
    states: Mutex<HashMap<GroupId, GroupState>>,
}

impl LifecycleController {
    pub fn new(
        cache: Arc<SandboxCache>,
        store: Arc<PersistenceStore>,
        coordinator: Arc<SyncCoordinator>,
        confirmation: Arc<dyn CloseConfirmation>,
        policy: ClosePolicy,
    ) -> Self {
        Self {
            cache,
            store,
            coordinator,
            confirmation,
            policy,
            states: Mutex::new(HashMap::new()),
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<GroupId, GroupState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state of `group_id`, or `None` if it was never seen or has
    /// been deleted.
    pub fn state(&self, group_id: &GroupId) -> Option<GroupState> {
        let recorded = self.states().get(group_id).copied();
        match recorded {
            Some(GroupState::ClosingLast) => Some(GroupState::ClosingLast),
            _ if self.coordinator.is_group_active(group_id) => Some(GroupState::Active),
            other => other,
        }
    }

    /// Marks `group_id` active again after a view opened.
    pub fn mark_active(&self, group_id: &GroupId) {
        let mut states = self.states();
        if states.get(group_id) != Some(&GroupState::ClosingLast) {
            states.insert(group_id.clone(), GroupState::Active);
        }
    }

    fn set_state(&self, group_id: &GroupId, state: GroupState) {
        self.states().insert(group_id.clone(), state);
    }

    fn forget(&self, group_id: &GroupId) {
        self.states().remove(group_id);
    }

    /// Number of groups whose state is tracked.
    pub fn tracked_groups(&self) -> usize {
        self.states().len()
    }

    /// Handles a view of `group_id` closing.
    ///
    /// For the last view this suspends on the confirmation. `abortable`
    /// says whether the host can keep the view open if the user says no.
    pub async fn close_view(
        &self,
        group_id: &GroupId,
        handle: ViewHandle,
        abortable: bool,
    ) -> CloseOutcome {
        if let Departure::Left(remaining) = self.coordinator.leave_unless_last(group_id, handle) {
            debug!("View {} left {} ({} remaining)", handle, group_id, remaining);
            return CloseOutcome::Detached;
        }

        {
            let mut states = self.states();
            if states.get(group_id) == Some(&GroupState::ClosingLast) {
                return CloseOutcome::AlreadyClosing;
            }
            states.insert(group_id.clone(), GroupState::ClosingLast);
        }

        let decision = self.decide(group_id).await;

        // Another view may have opened while the user was deciding.
        if self.coordinator.member_count(group_id) > 1 {
            self.set_state(group_id, GroupState::Active);
            if matches!(decision, Decision::Keep) && abortable {
                return CloseOutcome::KeptOpen;
            }
            self.coordinator.leave(group_id, handle);
            debug!("Group {} reopened during close; not deleting", group_id);
            return CloseOutcome::Detached;
        }

        match decision {
            Decision::Delete => {
                if let Err(e) = self.delete_group(group_id).await {
                    warn!("Failed to delete sandbox {}: {}", group_id, e);
                }
                self.coordinator.leave(group_id, handle);
                self.forget(group_id);
                info!("Deleted sandbox {} on last close", group_id);
                CloseOutcome::Deleted
            }
            Decision::Keep if abortable => {
                self.set_state(group_id, GroupState::Active);
                debug!("Close of {} cancelled; view stays open", group_id);
                CloseOutcome::KeptOpen
            }
            Decision::Keep | Decision::Retain => {
                self.coordinator.leave(group_id, handle);
                self.set_state(group_id, GroupState::Retained);
                info!(
                    "Retained sandbox {} for {} day(s)",
                    group_id, self.policy.retention_days
                );
                CloseOutcome::Retained
            }
        }
    }

    async fn decide(&self, group_id: &GroupId) -> Decision {
        let empty = self
            .cache
            .get(group_id)
            .is_none_or(|r| r.content.is_empty());
        if empty && self.policy.delete_empty_without_confirm {
            return Decision::Delete;
        }
        if !self.policy.confirm_on_last_close {
            return Decision::Retain;
        }

        let name = self
            .coordinator
            .display_name(group_id)
            .unwrap_or_else(|| group_id.to_string());
        let title = format!("Delete {name}?");
        let message = format!(
            "This is the last open view of {name}. Delete it now? \
             If you keep it, it is removed after {} day(s) without edits.",
            self.policy.retention_days
        );

        match self.confirmation.confirm(&title, &message).await {
            Ok(true) => Decision::Delete,
            Ok(false) => Decision::Keep,
            Err(e) => {
                warn!("Close confirmation for {} failed, keeping it: {}", group_id, e);
                Decision::Retain
            }
        }
    }

    /// Removes `group_id` from the cache and durable storage.
    ///
    /// The cache entry goes first so no further edit can schedule a write;
    /// the store delete then cancels the pending one.
    pub async fn delete_group(&self, group_id: &GroupId) -> SyncResult<()> {
        self.cache.delete(group_id);
        self.store.delete(group_id).await?;
        Ok(())
    }

    /// Deletes durable records past the retention window whose group has no
    /// open view, and drops them from the cache.
    pub async fn sweep_expired(&self) -> SyncResult<SweepReport> {
        let coordinator = Arc::clone(&self.coordinator);
        let report = self
            .store
            .sweep_expired(self.policy.retention_days, |id| {
                coordinator.is_group_active(id)
            })
            .await?;

        for id in &report.deleted {
            if !self.coordinator.is_group_active(id) {
                self.cache.delete(id);
                self.forget(id);
            }
        }
        Ok(report)
    }

    /// Writes every non-empty sandbox to durable storage and cancels all
    /// pending debounced writes. Failures are logged and counted, never
    /// returned.
    pub async fn shutdown(&self) -> FlushReport {
        let mut report = FlushReport::default();
        for record in self.cache.get_all() {
            if record.content.is_empty() {
                continue;
            }
            match self.store.force_write(&record.id, record.content).await {
                Ok(()) => report.flushed += 1,
                Err(e) => {
                    warn!("Failed to flush sandbox {} on shutdown: {}", record.id, e);
                    report.failed += 1;
                }
            }
        }
        let cancelled = self.store.cancel_all();
        info!(
            "Shutdown flush: {} written, {} failed, {} pending write(s) dropped",
            report.flushed, report.failed, cancelled
        );
        report
    }
}
