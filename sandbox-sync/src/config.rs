//! Engine settings.

use crate::error::{SyncError, SyncResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for the sandbox engine.
///
/// Every field has a default, so a settings file only needs to name what it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// SQLite file holding durable records. `None` keeps them in memory.
    pub database_path: Option<PathBuf>,
    /// Debounce window for durable writes (ms).
    pub debounce_ms: u64,
    /// Days a closed, unedited sandbox is kept before the sweep deletes it.
    pub retention_days: u32,
    /// Re-run the retention sweep this often (s). `None` sweeps only at start.
    pub sweep_interval_secs: Option<u64>,
    /// Ask before deleting when the last view of a sandbox closes.
    /// When false, closed sandboxes are always retained.
    pub confirm_on_last_close: bool,
    /// Delete an empty sandbox on last close without asking.
    pub delete_empty_without_confirm: bool,
    /// Prefix for display names ("Sandbox 3").
    pub title_prefix: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            debounce_ms: 500,
            retention_days: 7,
            sweep_interval_secs: None,
            confirm_on_last_close: true,
            delete_empty_without_confirm: true,
            title_prefix: "Sandbox".to_string(),
        }
    }
}

impl SandboxConfig {
    /// Parses settings from a JSON document.
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Config(format!("invalid settings: {e}")))
    }

    /// Loads settings from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }

    /// Debounce window as a `Duration`.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Sweep interval as a `Duration`, if periodic sweeping is enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
