//! Sandbox records and their persisted wire shape.
//!
//! A [`SandboxRecord`] is the in-memory, already-validated form used by the
//! cache and the engine. On disk it is the JSON object
//! `{ schema_version, id, content, mtime }` produced by
//! [`SandboxRecord::to_value`]. Durable values are opaque JSON to the storage
//! engine, so every read goes through [`SandboxRecord::from_value`], which
//! rejects anything that is not structurally sound instead of surfacing a
//! half-formed record.

use crate::{now_ms, GroupId};
use serde_json::Value;

/// Current persisted schema version.
///
/// Records written before the field existed carry no version and are read
/// as version 1.
pub const SCHEMA_VERSION: u32 = 1;

/// Reasons a durable value fails structural validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("`id` must be a non-empty string")]
    InvalidId,

    #[error("`content` must be a string")]
    InvalidContent,

    #[error("`mtime` must be a positive number")]
    InvalidMtime,

    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u64),
}

/// One sandbox document: its id, current content and last modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRecord {
    /// Group id, immutable for the lifetime of the record.
    pub id: GroupId,
    /// Full text content.
    pub content: String,
    /// Last modification, milliseconds since the Unix epoch. Always > 0.
    pub mtime: u64,
}

impl SandboxRecord {
    /// Creates a record with explicit fields.
    #[must_use]
    pub fn new(id: GroupId, content: impl Into<String>, mtime: u64) -> Self {
        Self {
            id,
            content: content.into(),
            mtime: mtime.max(1),
        }
    }

    /// Creates an empty record stamped with the current time.
    #[must_use]
    pub fn empty(id: GroupId) -> Self {
        Self::new(id, String::new(), now_ms())
    }

    /// Serializes to the opaque JSON value handed to a storage backend.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "id": self.id.as_str(),
            "content": self.content,
            "mtime": self.mtime,
        })
    }

    /// Validates a raw durable value and converts it into a record.
    ///
    /// `mtime` may be any positive JSON number; fractional values are
    /// truncated to whole milliseconds.
    pub fn from_value(value: &Value) -> Result<Self, RecordError> {
        let obj = value.as_object().ok_or(RecordError::NotAnObject)?;

        if let Some(version) = obj.get("schema_version") {
            let version = version.as_u64().ok_or(RecordError::UnsupportedVersion(0))?;
            if version == 0 || version > u64::from(SCHEMA_VERSION) {
                return Err(RecordError::UnsupportedVersion(version));
            }
        }

        let id = obj
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(RecordError::InvalidId)?;
        let content = obj
            .get("content")
            .and_then(Value::as_str)
            .ok_or(RecordError::InvalidContent)?;
        let mtime = obj
            .get("mtime")
            .and_then(parse_mtime)
            .ok_or(RecordError::InvalidMtime)?;

        let id = GroupId::new(id).map_err(|_| RecordError::InvalidId)?;
        Ok(Self {
            id,
            content: content.to_owned(),
            mtime,
        })
    }
}

fn parse_mtime(value: &Value) -> Option<u64> {
    if let Some(ms) = value.as_u64() {
        return (ms > 0).then_some(ms);
    }
    let ms = value.as_f64()?;
    if !ms.is_finite() || ms < 1.0 {
        return None;
    }
    Some(ms as u64)
}
