//! SQLite-backed record engine.
//!
//! One table, one row per sandbox, the record stored as JSON text. Upserts
//! keep the row's rowid so `get_all` returns ids in first-insertion order.

use crate::backend::RecordBackend;
use crate::error::{StorageError, StorageResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Durable record engine backed by a SQLite file.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens (or creates) a record database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory record database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.init_schema()?;
        Ok(backend)
    }

    fn init_schema(&self) -> StorageResult<()> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sandboxes (
                id TEXT PRIMARY KEY NOT NULL,
                record TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Backend("sqlite connection lock poisoned".into()))
    }
}

/// Unparseable text reads as `null`, which the store then rejects.
fn decode(id: &str, text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|e| {
        warn!("Stored record {} is not valid JSON: {}", id, e);
        Value::Null
    })
}

impl RecordBackend for SqliteBackend {
    fn get(&self, id: &str) -> StorageResult<Option<Value>> {
        let conn = self.conn()?;
        let text: Option<String> = conn
            .query_row(
                "SELECT record FROM sandboxes WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text.map(|t| decode(id, &t)))
    }

    fn put(&self, id: &str, value: &Value) -> StorageResult<()> {
        let text = serde_json::to_string(value)?;
        self.conn()?.execute(
            "INSERT INTO sandboxes (id, record) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET record = excluded.record",
            params![id, text],
        )?;
        Ok(())
    }

    fn delete(&self, id: &str) -> StorageResult<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM sandboxes WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn get_all(&self) -> StorageResult<Vec<(String, Value)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, record FROM sandboxes ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let text: String = row.get(1)?;
            Ok((id, text))
        })?;

        let mut result = Vec::new();
        for row in rows {
            let (id, text) = row?;
            let value = decode(&id, &text);
            result.push((id, value));
        }
        Ok(result)
    }

    fn count(&self) -> StorageResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM sandboxes", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
