//! Sandbox engine: the context object owning cache, store, coordinator and
//! lifecycle.
//!
//! Construct one per host session with [`SandboxEngine::start`] (or
//! [`SandboxEngine::with_backend`]) and tear it down with
//! [`SandboxEngine::shutdown`]. Host activity enters through
//! [`SandboxEngine::dispatch`].

use crate::cache::SandboxCache;
use crate::config::SandboxConfig;
use crate::confirm::CloseConfirmation;
use crate::coordinator::SyncCoordinator;
use crate::error::SyncResult;
use crate::lifecycle::{CloseOutcome, ClosePolicy, FlushReport, LifecycleController};
use crate::view::ViewEvent;
use sandbox_storage::{PersistenceStore, RecordBackend, SqliteBackend, SweepReport};
use sandbox_types::{GroupId, ViewHandle};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of dispatching one [`ViewEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A view joined its group.
    Joined {
        /// True if the view opened the group.
        first_view: bool,
        /// Display ordinal of the group.
        ordinal: Option<usize>,
    },
    /// A view closed (or tried to).
    Closed(CloseOutcome),
    /// An edit was fanned out to this many sibling views.
    Broadcast { pushed: usize },
}

/// Owns every piece of sandbox state for one session.
pub struct SandboxEngine {
    config: SandboxConfig,
    cache: Arc<SandboxCache>,
    store: Arc<PersistenceStore>,
    coordinator: Arc<SyncCoordinator>,
    lifecycle: Arc<LifecycleController>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SandboxEngine {
    /// Opens the configured SQLite database (or an in-memory one) and starts
    /// the engine.
    pub async fn start(
        config: SandboxConfig,
        confirmation: Arc<dyn CloseConfirmation>,
    ) -> SyncResult<Arc<Self>> {
        let backend: Arc<dyn RecordBackend> = match &config.database_path {
            Some(path) => Arc::new(SqliteBackend::open(path)?),
            None => Arc::new(SqliteBackend::open_in_memory()?),
        };
        Self::with_backend(config, backend, confirmation).await
    }

    /// Starts the engine over an existing backend.
    ///
    /// Hydrates the cache, runs the ready sweep and, if configured, spawns
    /// the periodic sweep.
    pub async fn with_backend(
        config: SandboxConfig,
        backend: Arc<dyn RecordBackend>,
        confirmation: Arc<dyn CloseConfirmation>,
    ) -> SyncResult<Arc<Self>> {
        let store = Arc::new(PersistenceStore::new(backend));
        let cache = Arc::new(SandboxCache::new());
        let coordinator = Arc::new(SyncCoordinator::new(
            Arc::clone(&cache),
            Arc::clone(&store),
            config.debounce(),
            config.title_prefix.clone(),
        ));
        let policy = ClosePolicy {
            confirm_on_last_close: config.confirm_on_last_close,
            delete_empty_without_confirm: config.delete_empty_without_confirm,
            retention_days: config.retention_days,
        };
        let lifecycle = Arc::new(LifecycleController::new(
            Arc::clone(&cache),
            Arc::clone(&store),
            Arc::clone(&coordinator),
            confirmation,
            policy,
        ));

        cache.hydrate(&store).await?;
        if let Err(e) = lifecycle.sweep_expired().await {
            warn!("Ready sweep failed: {}", e);
        }

        let engine = Arc::new(Self {
            config,
            cache,
            store,
            coordinator,
            lifecycle,
            sweeper: Mutex::new(None),
        });
        engine.spawn_periodic_sweep();
        info!("Sandbox engine ready with {} sandbox(es)", engine.cache.len());
        Ok(engine)
    }

    fn spawn_periodic_sweep(&self) {
        let Some(period) = self.config.sweep_interval() else {
            return;
        };
        let lifecycle = Arc::clone(&self.lifecycle);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; the ready sweep already ran.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = lifecycle.sweep_expired().await {
                    warn!("Periodic sweep failed: {}", e);
                }
            }
        });
        *self.sweeper.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        debug!("Periodic sweep every {:?}", period);
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SandboxCache> {
        &self.cache
    }

    pub fn store(&self) -> &Arc<PersistenceStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    // ── Host events ──────────────────────────────────────────────

    /// Applies one view-host event.
    pub async fn dispatch(&self, event: ViewEvent) -> EventOutcome {
        match event {
            ViewEvent::Opened { group_id, view } => {
                let first_view = self.coordinator.join(&group_id, view);
                self.lifecycle.mark_active(&group_id);
                EventOutcome::Joined {
                    first_view,
                    ordinal: self.coordinator.ordinal(&group_id),
                }
            }
            ViewEvent::Closed {
                group_id,
                handle,
                abortable,
            } => EventOutcome::Closed(
                self.lifecycle
                    .close_view(&group_id, handle, abortable)
                    .await,
            ),
            ViewEvent::ContentChanged {
                group_id,
                content,
                source,
            } => EventOutcome::Broadcast {
                pushed: self.coordinator.broadcast(&group_id, &content, source),
            },
        }
    }

    // ── Queries exposed to the host ──────────────────────────────

    /// Sets the content of the group `handle` belongs to.
    pub fn set_content(&self, handle: ViewHandle, content: &str) -> bool {
        self.coordinator.set_content(handle, content)
    }

    pub fn is_last_view(&self, group_id: &GroupId, handle: ViewHandle) -> bool {
        self.coordinator.is_last_view(group_id, handle)
    }

    pub fn ordinal(&self, group_id: &GroupId) -> Option<usize> {
        self.coordinator.ordinal(group_id)
    }

    pub fn display_name(&self, group_id: &GroupId) -> Option<String> {
        self.coordinator.display_name(group_id)
    }

    /// Runs a retention sweep now.
    pub async fn sweep_expired(&self) -> SyncResult<SweepReport> {
        self.lifecycle.sweep_expired().await
    }

    /// Stops the periodic sweep and flushes every non-empty sandbox.
    pub async fn shutdown(&self) -> FlushReport {
        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = sweeper {
            handle.abort();
        }
        self.lifecycle.shutdown().await
    }
}
