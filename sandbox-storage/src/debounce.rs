//! Per-id debounce timers and write sequencing.
//!
//! Each id has at most one open window. The first trigger in a quiet period
//! fires immediately (leading edge) and opens the window; triggers inside the
//! window replace a single trailing payload and restart the window timer.
//! When the window elapses, the trailing payload, if any, is handed to the
//! flush callback.
//!
//! Sequence numbers are issued under the same lock that guards the windows,
//! so a trailing flush and a cancel for the same id are always totally
//! ordered.

use sandbox_types::GroupId;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// What a trigger asked the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// No window was open: write now, using this sequence number.
    Leading(u64),
    /// A window was open: the payload was parked as the trailing write.
    Coalesced,
}

struct Window {
    generation: u64,
    trailing: Option<String>,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Slots {
    windows: HashMap<GroupId, Window>,
    next_generation: u64,
    next_sequence: u64,
}

impl Slots {
    fn issue(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }
}

/// Arena of cancellable per-id timers.
#[derive(Clone, Default)]
pub(crate) struct Debouncer {
    slots: Arc<Mutex<Slots>>,
}

impl Debouncer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // Nothing in this module panics while holding the lock; recover the
        // data if another thread did.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a change for `id`.
    ///
    /// `flush` receives the trailing payload and its sequence number when the
    /// window closes. It is only called if a trailing payload exists.
    pub(crate) fn trigger<F, Fut>(
        &self,
        id: &GroupId,
        content: String,
        delay: Duration,
        flush: F,
    ) -> Trigger
    where
        F: FnOnce(u64, String) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slots = self.lock();
        slots.next_generation += 1;
        let generation = slots.next_generation;

        let timer = self.spawn_timer(id.clone(), generation, delay, flush);

        match slots.windows.get_mut(id) {
            Some(window) => {
                window.timer.abort();
                window.timer = timer;
                window.generation = generation;
                window.trailing = Some(content);
                debug!("Coalesced write for {} into open window", id);
                Trigger::Coalesced
            }
            None => {
                let seq = slots.issue();
                slots.windows.insert(
                    id.clone(),
                    Window {
                        generation,
                        trailing: None,
                        timer,
                    },
                );
                Trigger::Leading(seq)
            }
        }
    }

    fn spawn_timer<F, Fut>(
        &self,
        id: GroupId,
        generation: u64,
        delay: Duration,
        flush: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(u64, String) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let due = {
                let mut slots = slots.lock().unwrap_or_else(|p| p.into_inner());
                let current = slots
                    .windows
                    .get(&id)
                    .is_some_and(|w| w.generation == generation);
                if !current {
                    return;
                }
                let trailing = slots.windows.remove(&id).and_then(|w| w.trailing);
                trailing.map(|content| (slots.issue(), content))
            };

            if let Some((seq, content)) = due {
                flush(seq, content).await;
            }
        })
    }

    /// Closes the window for `id` without flushing and issues a sequence
    /// number for the operation that supersedes it.
    ///
    /// Returns the sequence number and whether a window was open.
    pub(crate) fn cancel_and_sequence(&self, id: &GroupId) -> (u64, bool) {
        let mut slots = self.lock();
        let cancelled = match slots.windows.remove(id) {
            Some(window) => {
                window.timer.abort();
                true
            }
            None => false,
        };
        (slots.issue(), cancelled)
    }

    /// Closes the window for `id` without flushing.
    pub(crate) fn cancel(&self, id: &GroupId) -> bool {
        let mut slots = self.lock();
        match slots.windows.remove(id) {
            Some(window) => {
                window.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Closes every window without flushing. Returns how many were open.
    pub(crate) fn cancel_all(&self) -> usize {
        let mut slots = self.lock();
        let count = slots.windows.len();
        for (_, window) in slots.windows.drain() {
            window.timer.abort();
        }
        count
    }

    pub(crate) fn is_pending(&self, id: &GroupId) -> bool {
        self.lock().windows.contains_key(id)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.lock().windows.len()
    }
}
