//! Shared test helpers for sandbox-sync tests.

#![allow(dead_code)]

use async_trait::async_trait;
use sandbox_sync::{
    CloseConfirmation, ConfirmationError, GroupId, MemoryBackend, SandboxConfig, SandboxEngine,
    SandboxView, ViewHandle,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

pub const DEBOUNCE_MS: u64 = 30;
pub const SETTLE: Duration = Duration::from_millis(200);

static TRACING: Once = Once::new();

/// Routes engine logs to the test writer. Honors `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn gid(s: &str) -> GroupId {
    GroupId::new(s).unwrap()
}

pub async fn settle() {
    tokio::time::sleep(SETTLE).await;
}

/// An editor view holding a buffer and counting programmatic sets.
pub struct MockView {
    handle: ViewHandle,
    buffer: Mutex<String>,
    sets: AtomicUsize,
}

impl MockView {
    pub fn new() -> Arc<Self> {
        Self::with_content("")
    }

    pub fn with_content(content: &str) -> Arc<Self> {
        Arc::new(Self {
            handle: ViewHandle::new(),
            buffer: Mutex::new(content.to_string()),
            sets: AtomicUsize::new(0),
        })
    }

    /// Simulates the user typing: changes the buffer without a set call.
    pub fn type_text(&self, content: &str) {
        *self.buffer.lock().unwrap() = content.to_string();
    }

    pub fn set_calls(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

impl SandboxView for MockView {
    fn handle(&self) -> ViewHandle {
        self.handle
    }

    fn content(&self) -> String {
        self.buffer.lock().unwrap().clone()
    }

    fn set_content(&self, content: &str) {
        self.sets.fetch_add(1, Ordering::SeqCst);
        *self.buffer.lock().unwrap() = content.to_string();
    }
}

/// Answers with a fixed value and records how often it was asked.
pub struct CountingConfirmation {
    answer: bool,
    delay: Duration,
    asked: AtomicUsize,
    last_message: Mutex<Option<(String, String)>>,
}

impl CountingConfirmation {
    pub fn new(answer: bool) -> Arc<Self> {
        Self::delayed(answer, Duration::ZERO)
    }

    pub fn delayed(answer: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            answer,
            delay,
            asked: AtomicUsize::new(0),
            last_message: Mutex::new(None),
        })
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }

    pub fn last_message(&self) -> Option<(String, String)> {
        self.last_message.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloseConfirmation for CountingConfirmation {
    async fn confirm(&self, title: &str, message: &str) -> Result<bool, ConfirmationError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        *self.last_message.lock().unwrap() = Some((title.to_string(), message.to_string()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.answer)
    }
}

/// A dialog that always fails to show.
pub struct FailingConfirmation;

#[async_trait]
impl CloseConfirmation for FailingConfirmation {
    async fn confirm(&self, _title: &str, _message: &str) -> Result<bool, ConfirmationError> {
        Err(ConfirmationError::Failed("no display".into()))
    }
}

pub fn test_config() -> SandboxConfig {
    SandboxConfig {
        debounce_ms: DEBOUNCE_MS,
        ..SandboxConfig::default()
    }
}

/// Starts an engine over a fresh memory backend.
pub async fn memory_engine(
    confirmation: Arc<dyn CloseConfirmation>,
) -> (Arc<MemoryBackend>, Arc<SandboxEngine>) {
    memory_engine_with(test_config(), confirmation).await
}

pub async fn memory_engine_with(
    config: SandboxConfig,
    confirmation: Arc<dyn CloseConfirmation>,
) -> (Arc<MemoryBackend>, Arc<SandboxEngine>) {
    init_tracing();
    let backend = Arc::new(MemoryBackend::new());
    let engine = SandboxEngine::with_backend(config, backend.clone(), confirmation)
        .await
        .unwrap();
    (backend, engine)
}
