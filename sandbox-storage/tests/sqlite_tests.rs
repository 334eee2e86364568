use sandbox_storage::{PersistenceStore, RecordBackend, SqliteBackend};
use sandbox_types::{GroupId, SandboxRecord};
use serde_json::json;
use std::time::Duration;

fn gid(s: &str) -> GroupId {
    GroupId::new(s).unwrap()
}

#[test]
fn backend_roundtrip_in_memory() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    backend.put("a", &json!({ "k": 1 })).unwrap();
    assert_eq!(backend.get("a").unwrap(), Some(json!({ "k": 1 })));
    assert_eq!(backend.count().unwrap(), 1);
    assert!(backend.delete("a").unwrap());
    assert!(!backend.delete("a").unwrap());
    assert_eq!(backend.get("a").unwrap(), None);
}

#[test]
fn upsert_keeps_insertion_order() {
    let backend = SqliteBackend::open_in_memory().unwrap();
    backend.put("first", &json!(1)).unwrap();
    backend.put("second", &json!(2)).unwrap();
    backend.put("first", &json!(3)).unwrap();

    let all = backend.get_all().unwrap();
    assert_eq!(
        all,
        vec![("first".to_string(), json!(3)), ("second".to_string(), json!(2))]
    );
}

#[test]
fn creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("sandboxes.db");
    let backend = SqliteBackend::open(&path).unwrap();
    backend.put("a", &json!(null)).unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sandboxes.db");

    {
        let store = PersistenceStore::open(&path).unwrap();
        store.force_write(&gid("g1"), "persisted").await.unwrap();
        store.debounced_write(&gid("g2"), "also", Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(150)).await;
    }

    let store = PersistenceStore::open(&path).unwrap();
    let all = store.get_all().await.unwrap();
    let contents: Vec<&str> = all.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["persisted", "also"]);
}

#[tokio::test]
async fn corrupt_row_reads_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sandboxes.db");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE sandboxes (id TEXT PRIMARY KEY NOT NULL, record TEXT NOT NULL);
             INSERT INTO sandboxes (id, record) VALUES ('bad', '{not json');",
        )
        .unwrap();
    }

    let store = PersistenceStore::open(&path).unwrap();
    store
        .put(&SandboxRecord::new(gid("good"), "ok", 1))
        .await
        .unwrap();
    assert_eq!(store.get(&gid("bad")).await.unwrap(), None);
    assert_eq!(store.get_all().await.unwrap().len(), 1);
}
