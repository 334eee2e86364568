//! View-group membership and content fan-out.
//!
//! A group is the set of open views sharing one sandbox id. Broadcasting a
//! change is synchronous: by the time [`SyncCoordinator::broadcast`] returns,
//! the cache and every sibling view hold the new content. Only the durable
//! write is deferred, through the store's debouncer.

use crate::cache::SandboxCache;
use crate::view::SandboxView;
use sandbox_storage::PersistenceStore;
use sandbox_types::{GroupId, ViewHandle};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::debug;

type Members = HashMap<GroupId, Vec<Arc<dyn SandboxView>>>;

/// Result of [`SyncCoordinator::leave_unless_last`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The view left; this many members remain.
    Left(usize),
    /// The view is the group's only member and was not removed.
    Last,
}

/// Tracks group membership and keeps sibling views in sync.
pub struct SyncCoordinator {
    cache: Arc<SandboxCache>,
    store: Arc<PersistenceStore>,
    groups: RwLock<Members>,
    debounce: Duration,
    title_prefix: String,
}

impl SyncCoordinator {
    /// Creates a coordinator writing through `cache` and `store`.
    pub fn new(
        cache: Arc<SandboxCache>,
        store: Arc<PersistenceStore>,
        debounce: Duration,
        title_prefix: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            store,
            groups: RwLock::new(HashMap::new()),
            debounce,
            title_prefix: title_prefix.into(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Members> {
        self.groups.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Members> {
        self.groups.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of a group's members, taken so view callbacks run without
    /// the membership lock held.
    fn members(&self, group_id: &GroupId) -> Vec<Arc<dyn SandboxView>> {
        self.read().get(group_id).cloned().unwrap_or_default()
    }

    // ── Membership ───────────────────────────────────────────────

    /// Adds `view` to `group_id`, registering the sandbox in the cache if
    /// needed, and loads the current content into the view.
    ///
    /// Returns true if this view opened the group (it had no members).
    /// Joining with a handle that is already a member changes nothing.
    pub fn join(&self, group_id: &GroupId, view: Arc<dyn SandboxView>) -> bool {
        let handle = view.handle();
        let opened = {
            let mut groups = self.write();
            let members = groups.entry(group_id.clone()).or_default();
            if members.iter().any(|m| m.handle() == handle) {
                return false;
            }
            members.push(Arc::clone(&view));
            members.len() == 1
        };

        if self.cache.register(group_id) {
            debug!("New sandbox {} opened by view {}", group_id, handle);
        }
        if let Some(record) = self.cache.get(group_id) {
            if view.content() != record.content {
                view.set_content(&record.content);
            }
        }
        opened
    }

    /// Removes `handle` from `group_id`. Returns the remaining member count.
    /// Unknown groups or handles are ignored.
    pub fn leave(&self, group_id: &GroupId, handle: ViewHandle) -> usize {
        let mut groups = self.write();
        let Some(members) = groups.get_mut(group_id) else {
            return 0;
        };
        members.retain(|m| m.handle() != handle);
        let remaining = members.len();
        if remaining == 0 {
            groups.remove(group_id);
            debug!("Group {} has no open views", group_id);
        }
        remaining
    }

    /// Removes `handle` from `group_id` unless it is the only member.
    ///
    /// The check and the removal happen under one write lock, so of several
    /// views closing at once exactly one sees [`Departure::Last`].
    pub fn leave_unless_last(&self, group_id: &GroupId, handle: ViewHandle) -> Departure {
        let mut groups = self.write();
        let Some(members) = groups.get_mut(group_id) else {
            return Departure::Left(0);
        };
        if members.len() == 1 && members[0].handle() == handle {
            return Departure::Last;
        }
        members.retain(|m| m.handle() != handle);
        let remaining = members.len();
        if remaining == 0 {
            groups.remove(group_id);
        }
        Departure::Left(remaining)
    }

    /// True iff `handle` is the only member of `group_id`.
    pub fn is_last_view(&self, group_id: &GroupId, handle: ViewHandle) -> bool {
        self.read()
            .get(group_id)
            .is_some_and(|m| m.len() == 1 && m[0].handle() == handle)
    }

    /// True if at least one view of `group_id` is open.
    pub fn is_group_active(&self, group_id: &GroupId) -> bool {
        self.read().get(group_id).is_some_and(|m| !m.is_empty())
    }

    /// Number of open views of `group_id`.
    pub fn member_count(&self, group_id: &GroupId) -> usize {
        self.read().get(group_id).map_or(0, Vec::len)
    }

    /// Ids of every group with at least one open view.
    pub fn active_groups(&self) -> Vec<GroupId> {
        self.read()
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// The group `handle` belongs to, if any.
    pub fn group_of(&self, handle: ViewHandle) -> Option<GroupId> {
        self.read()
            .iter()
            .find(|(_, m)| m.iter().any(|v| v.handle() == handle))
            .map(|(id, _)| id.clone())
    }

    // ── Fan-out ──────────────────────────────────────────────────

    /// Propagates an edit made in `source` to the cache, to every sibling
    /// view whose buffer differs, and schedules the durable write.
    ///
    /// Returns the number of sibling views that were updated. A group that
    /// is not registered in the cache (for example, just deleted) is left
    /// alone.
    pub fn broadcast(&self, group_id: &GroupId, content: &str, source: ViewHandle) -> usize {
        if self.cache.update(group_id, content).is_none() {
            debug!("Ignoring edit for unregistered sandbox {}", group_id);
            return 0;
        }

        let mut pushed = 0;
        for view in self.members(group_id) {
            if view.handle() == source {
                continue;
            }
            if view.content() != content {
                view.set_content(content);
                pushed += 1;
            }
        }

        self.store.debounced_write(group_id, content, self.debounce);
        pushed
    }

    /// Replaces the content of every view of `group_id`, including the one
    /// that triggered it. Used when the host sets content programmatically.
    pub fn replace_content(&self, group_id: &GroupId, content: &str) -> usize {
        if self.cache.update(group_id, content).is_none() {
            return 0;
        }
        let mut pushed = 0;
        for view in self.members(group_id) {
            if view.content() != content {
                view.set_content(content);
                pushed += 1;
            }
        }
        self.store.debounced_write(group_id, content, self.debounce);
        pushed
    }

    /// Sets the content of the group `handle` belongs to.
    /// Returns false if the handle is not a member of any group.
    pub fn set_content(&self, handle: ViewHandle, content: &str) -> bool {
        match self.group_of(handle) {
            Some(group_id) => {
                self.replace_content(&group_id, content);
                true
            }
            None => false,
        }
    }

    // ── Display ──────────────────────────────────────────────────

    /// 1-based position of `group_id` among all known sandboxes.
    ///
    /// Positions follow durable insertion order, not open-view order, so a
    /// sandbox that is closed and reopened keeps its number.
    pub fn ordinal(&self, group_id: &GroupId) -> Option<usize> {
        self.cache.position(group_id).map(|i| i + 1)
    }

    /// Display name such as "Sandbox 2".
    pub fn display_name(&self, group_id: &GroupId) -> Option<String> {
        self.ordinal(group_id)
            .map(|n| format!("{} {}", self.title_prefix, n))
    }
}
