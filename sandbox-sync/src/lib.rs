//! Multi-view synchronization engine for sandbox documents.
//!
//! A sandbox is an ephemeral text document that several views can show at
//! once. This crate keeps those views consistent, writes their content
//! through to durable storage, and decides what happens to a sandbox when
//! its last view closes.
//!
//! # Architecture
//!
//! ## Components
//!
//! - **Cache**: current content per sandbox; the fast path
//! - **Coordinator**: which views belong to which sandbox, and fan-out of
//!   edits between them
//! - **Lifecycle**: the last-view close decision, retention sweep and
//!   teardown flush
//! - **Engine**: the context object owning all of the above
//! - **Orchestrator**: an event loop feeding host events into the engine
//!
//! ## Edit flow
//!
//! 1. A view reports an edit
//! 2. The cache is updated and every sibling view receives the content, in
//!    the same call
//! 3. A per-sandbox debounced write is scheduled in the durable store
//!
//! # Example
//!
//! ```
//! use sandbox_sync::{FixedConfirmation, SandboxConfig, SandboxEngine};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SandboxConfig {
//!     retention_days: 14,
//!     ..Default::default()
//! };
//! let engine = SandboxEngine::start(config, Arc::new(FixedConfirmation(true))).await?;
//! assert!(engine.cache().is_empty());
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod confirm;
mod coordinator;
mod engine;
mod error;
mod lifecycle;
mod orchestrator;
mod view;

pub use cache::SandboxCache;
pub use config::SandboxConfig;
pub use confirm::{CloseConfirmation, ConfirmationError, FixedConfirmation};
pub use coordinator::{Departure, SyncCoordinator};
pub use engine::{EventOutcome, SandboxEngine};
pub use error::{SyncError, SyncResult};
pub use lifecycle::{ClosePolicy, CloseOutcome, FlushReport, GroupState, LifecycleController};
pub use orchestrator::{spawn_orchestrator, OrchestratorCommand, OrchestratorHandle};
pub use view::{SandboxView, ViewEvent};

pub use sandbox_storage::{MemoryBackend, PersistenceStore, RecordBackend, SweepReport};
pub use sandbox_types::{GroupId, SandboxRecord, ViewHandle};
