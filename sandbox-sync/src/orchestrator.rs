//! Event loop connecting a view host to a [`SandboxEngine`].
//!
//! The host pushes [`ViewEvent`]s into a channel; a single task applies them
//! in order. Closing events may wait on a confirmation dialog, so each one
//! runs in its own task and the loop keeps serving opens and edits
//! meanwhile.

use crate::engine::{EventOutcome, SandboxEngine};
use crate::error::{SyncError, SyncResult};
use crate::lifecycle::FlushReport;
use crate::view::ViewEvent;
use sandbox_storage::SweepReport;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Commands accepted by the orchestrator loop.
pub enum OrchestratorCommand {
    /// Apply an event; reply with its outcome if a sender is given.
    Event {
        event: ViewEvent,
        reply: Option<oneshot::Sender<EventOutcome>>,
    },
    /// Run a retention sweep now.
    Sweep {
        reply: oneshot::Sender<SyncResult<SweepReport>>,
    },
    /// Flush and stop the loop.
    Shutdown { reply: oneshot::Sender<FlushReport> },
}

/// Host-side handle to a running orchestrator.
pub struct OrchestratorHandle {
    tx: mpsc::Sender<OrchestratorCommand>,
    task: JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Queues an event without waiting for it to be applied.
    pub async fn send(&self, event: ViewEvent) -> SyncResult<()> {
        self.tx
            .send(OrchestratorCommand::Event { event, reply: None })
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }

    /// Queues an event and waits for its outcome.
    pub async fn request(&self, event: ViewEvent) -> SyncResult<EventOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(OrchestratorCommand::Event {
                event,
                reply: Some(reply),
            })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    /// Runs a retention sweep through the loop.
    pub async fn sweep(&self) -> SyncResult<SweepReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(OrchestratorCommand::Sweep { reply })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    /// Flushes every sandbox and stops the loop.
    pub async fn shutdown(self) -> SyncResult<FlushReport> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(OrchestratorCommand::Shutdown { reply })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        let report = rx.await.map_err(|_| SyncError::ChannelClosed)?;
        if let Err(e) = self.task.await {
            warn!("Orchestrator task ended abnormally: {}", e);
        }
        Ok(report)
    }
}

/// Spawns the orchestrator loop for `engine`.
pub fn spawn_orchestrator(engine: Arc<SandboxEngine>, buffer: usize) -> OrchestratorHandle {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let task = tokio::spawn(run_loop(engine, rx));
    OrchestratorHandle { tx, task }
}

async fn run_loop(engine: Arc<SandboxEngine>, mut rx: mpsc::Receiver<OrchestratorCommand>) {
    info!("Sandbox orchestrator started");
    while let Some(command) = rx.recv().await {
        match command {
            OrchestratorCommand::Event { event, reply } => {
                debug!("Orchestrator event: {:?}", event);
                if matches!(event, ViewEvent::Closed { .. }) {
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        let outcome = engine.dispatch(event).await;
                        if let Some(reply) = reply {
                            let _ = reply.send(outcome);
                        }
                    });
                } else {
                    let outcome = engine.dispatch(event).await;
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                }
            }
            OrchestratorCommand::Sweep { reply } => {
                let _ = reply.send(engine.sweep_expired().await);
            }
            OrchestratorCommand::Shutdown { reply } => {
                let report = engine.shutdown().await;
                let _ = reply.send(report);
                break;
            }
        }
    }
    info!("Sandbox orchestrator stopped");
}
