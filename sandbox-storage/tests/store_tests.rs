use sandbox_storage::{MemoryBackend, PersistenceStore, RecordBackend, SweepReport};
use sandbox_types::{days_to_ms, now_ms, GroupId, SandboxRecord};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const DELAY: Duration = Duration::from_millis(30);
const SETTLE: Duration = Duration::from_millis(200);

fn gid(s: &str) -> GroupId {
    GroupId::new(s).unwrap()
}

fn memory_store() -> (Arc<MemoryBackend>, PersistenceStore) {
    let backend = Arc::new(MemoryBackend::new());
    let store = PersistenceStore::new(backend.clone());
    (backend, store)
}

fn aged(id: &str, days: u32) -> SandboxRecord {
    SandboxRecord::new(gid(id), format!("content of {id}"), now_ms() - days_to_ms(days))
}

// ── CRUD ─────────────────────────────────────────────────────────

#[tokio::test]
async fn put_and_get() {
    let (_, store) = memory_store();
    let record = SandboxRecord::new(gid("g1"), "hello", 10);

    store.put(&record).await.unwrap();
    assert_eq!(store.get(&gid("g1")).await.unwrap(), Some(record));
}

#[tokio::test]
async fn get_missing_is_none() {
    let (_, store) = memory_store();
    assert_eq!(store.get(&gid("nope")).await.unwrap(), None);
}

#[tokio::test]
async fn put_replaces_existing() {
    let (_, store) = memory_store();
    store.put(&SandboxRecord::new(gid("g1"), "one", 10)).await.unwrap();
    store.put(&SandboxRecord::new(gid("g1"), "two", 20)).await.unwrap();

    let record = store.get(&gid("g1")).await.unwrap().unwrap();
    assert_eq!(record.content, "two");
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn delete_removes_record() {
    let (_, store) = memory_store();
    store.put(&SandboxRecord::new(gid("g1"), "x", 10)).await.unwrap();
    store.delete(&gid("g1")).await.unwrap();
    assert_eq!(store.get(&gid("g1")).await.unwrap(), None);
}

#[tokio::test]
async fn delete_missing_is_noop() {
    let (_, store) = memory_store();
    store.delete(&gid("ghost")).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn get_all_keeps_insertion_order() {
    let (_, store) = memory_store();
    for id in ["c", "a", "b"] {
        store.put(&SandboxRecord::new(gid(id), id, 5)).await.unwrap();
    }
    // Updating an existing id does not move it.
    store.put(&SandboxRecord::new(gid("c"), "c2", 6)).await.unwrap();

    let ids: Vec<String> = store
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id.into_inner())
        .collect();
    assert_eq!(ids, vec!["c", "a", "b"]);
}

// ── Validation ───────────────────────────────────────────────────

#[tokio::test]
async fn malformed_record_reads_as_absent() {
    let (backend, store) = memory_store();
    backend
        .put("bad", &json!({ "id": "bad", "content": 42, "mtime": 1 }))
        .unwrap();

    assert_eq!(store.get(&gid("bad")).await.unwrap(), None);
}

#[tokio::test]
async fn malformed_records_do_not_block_get_all() {
    let (backend, store) = memory_store();
    backend.put("broken", &json!("garbage")).unwrap();
    backend
        .put("neg", &json!({ "id": "neg", "content": "", "mtime": -1 }))
        .unwrap();
    store.put(&SandboxRecord::new(gid("ok"), "fine", 3)).await.unwrap();

    let all = store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id.as_str(), "ok");
    // The raw count still sees every stored value.
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn record_under_mismatched_key_is_ignored() {
    let (backend, store) = memory_store();
    backend
        .put("a", &json!({ "id": "b", "content": "", "mtime": 1 }))
        .unwrap();
    assert_eq!(store.get(&gid("a")).await.unwrap(), None);
}

// ── Debounce ─────────────────────────────────────────────────────

#[tokio::test]
async fn first_debounced_write_lands_immediately() {
    let (_, store) = memory_store();
    let id = gid("g1");
    store.debounced_write(&id, "first", Duration::from_secs(60));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.get(&id).await.unwrap().unwrap().content, "first");
    assert!(store.has_pending(&id));
    store.cancel_all();
}

#[tokio::test]
async fn rapid_writes_coalesce_to_latest() {
    let (_, store) = memory_store();
    let id = gid("g1");
    for i in 1..=10 {
        store.debounced_write(&id, format!("v{i}"), DELAY);
    }
    assert_eq!(store.pending_count(), 1);

    tokio::time::sleep(SETTLE).await;
    assert_eq!(store.get(&id).await.unwrap().unwrap().content, "v10");
    assert!(!store.has_pending(&id));
}

#[tokio::test]
async fn independent_ids_do_not_interfere() {
    let (_, store) = memory_store();
    let a = gid("a");
    let b = gid("b");
    store.debounced_write(&a, "a1", DELAY);
    store.debounced_write(&b, "b1", DELAY);
    store.debounced_write(&a, "a2", DELAY);
    store.debounced_write(&b, "b2", DELAY);
    assert_eq!(store.pending_count(), 2);

    tokio::time::sleep(SETTLE).await;
    assert_eq!(store.get(&a).await.unwrap().unwrap().content, "a2");
    assert_eq!(store.get(&b).await.unwrap().unwrap().content, "b2");
}

#[tokio::test]
async fn delete_cancels_pending_write() {
    let (backend, store) = memory_store();
    let id = gid("g1");
    store.debounced_write(&id, "x", DELAY);
    store.debounced_write(&id, "y", DELAY);
    store.delete(&id).await.unwrap();
    assert!(!store.has_pending(&id));

    tokio::time::sleep(SETTLE).await;
    assert_eq!(store.get(&id).await.unwrap(), None);
    assert_eq!(backend.count().unwrap(), 0);
}

#[tokio::test]
async fn leading_write_cannot_resurrect_after_delete() {
    let (backend, store) = memory_store();
    for round in 0..20 {
        let id = gid(&format!("g{round}"));
        store.debounced_write(&id, "x", DELAY);
        store.delete(&id).await.unwrap();
    }

    tokio::time::sleep(SETTLE).await;
    assert_eq!(backend.count().unwrap(), 0);
}

#[tokio::test]
async fn write_gates_are_released_once_idle() {
    let (_, store) = memory_store();
    for round in 0..20 {
        let id = gid(&format!("g{round}"));
        store.debounced_write(&id, "x", DELAY);
        store.debounced_write(&id, "y", DELAY);
        if round % 2 == 0 {
            store.delete(&id).await.unwrap();
        }
    }
    assert!(store.in_flight_count() >= 10);

    tokio::time::sleep(SETTLE).await;
    assert_eq!(store.in_flight_count(), 0);
    assert_eq!(store.count().await.unwrap(), 10);
}

#[tokio::test]
async fn writes_after_delete_land_once_gate_is_released() {
    let (_, store) = memory_store();
    let id = gid("g1");
    for round in 0..5 {
        store.debounced_write(&id, format!("r{round}"), DELAY);
        store.delete(&id).await.unwrap();
        tokio::time::sleep(SETTLE).await;
        assert_eq!(store.get(&id).await.unwrap(), None);
        assert_eq!(store.in_flight_count(), 0);
    }

    store.force_write(&id, "again").await.unwrap();
    assert_eq!(store.get(&id).await.unwrap().unwrap().content, "again");
    assert_eq!(store.in_flight_count(), 0);
}

#[tokio::test]
async fn force_write_supersedes_pending_debounce() {
    let (_, store) = memory_store();
    let id = gid("g1");
    store.debounced_write(&id, "draft-1", DELAY);
    store.debounced_write(&id, "draft-2", DELAY);
    store.force_write(&id, "final").await.unwrap();
    assert!(!store.has_pending(&id));

    tokio::time::sleep(SETTLE).await;
    assert_eq!(store.get(&id).await.unwrap().unwrap().content, "final");
}

#[tokio::test]
async fn cancel_pending_drops_trailing_write() {
    let (_, store) = memory_store();
    let id = gid("g1");
    store.debounced_write(&id, "lead", DELAY);
    tokio::time::sleep(Duration::from_millis(10)).await;
    store.debounced_write(&id, "trail", DELAY);
    assert!(store.cancel_pending(&id));
    assert!(!store.cancel_pending(&id));

    tokio::time::sleep(SETTLE).await;
    assert_eq!(store.get(&id).await.unwrap().unwrap().content, "lead");
}

#[tokio::test]
async fn failed_write_is_recovered_by_next_trigger() {
    let (backend, store) = memory_store();
    let id = gid("g1");
    backend.set_fail_writes(true);
    store.debounced_write(&id, "lost", DELAY);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(store.get(&id).await.unwrap(), None);

    backend.set_fail_writes(false);
    store.debounced_write(&id, "kept", DELAY);
    tokio::time::sleep(SETTLE).await;
    assert_eq!(store.get(&id).await.unwrap().unwrap().content, "kept");
}

#[tokio::test]
async fn force_write_reports_failure() {
    let (backend, store) = memory_store();
    backend.set_fail_writes(true);
    assert!(store.force_write(&gid("g1"), "x").await.is_err());
}

// ── Retention ────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_respects_retention_boundary() {
    let (_, store) = memory_store();
    store.put(&aged("old", 8)).await.unwrap();
    store.put(&aged("young", 6)).await.unwrap();

    let report = store.sweep_expired(7, |_| false).await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.expired, 1);
    assert_eq!(report.deleted, vec![gid("old")]);
    assert!(store.get(&gid("old")).await.unwrap().is_none());
    assert!(store.get(&gid("young")).await.unwrap().is_some());
}

#[tokio::test]
async fn sweep_keeps_active_groups() {
    let (_, store) = memory_store();
    store.put(&aged("busy", 30)).await.unwrap();
    store.put(&aged("idle", 30)).await.unwrap();

    let report = store
        .sweep_expired(7, |id| id.as_str() == "busy")
        .await
        .unwrap();
    assert_eq!(report.deleted, vec![gid("idle")]);
    assert_eq!(report.skipped_active, vec![gid("busy")]);
    assert!(store.get(&gid("busy")).await.unwrap().is_some());
}

#[tokio::test]
async fn sweep_checks_activity_at_deletion_time() {
    let (_, store) = memory_store();
    store.put(&aged("first", 30)).await.unwrap();
    store.put(&aged("second", 30)).await.unwrap();

    // "second" becomes active while the sweep is already running.
    let reopened = AtomicBool::new(false);
    let report = store
        .sweep_expired(7, |id| {
            if id.as_str() == "first" {
                reopened.store(true, Ordering::SeqCst);
                return false;
            }
            reopened.load(Ordering::SeqCst)
        })
        .await
        .unwrap();

    assert_eq!(report.deleted, vec![gid("first")]);
    assert_eq!(report.skipped_active, vec![gid("second")]);
}

#[tokio::test]
async fn sweep_ignores_malformed_records() {
    let (backend, store) = memory_store();
    backend.put("junk", &json!({ "id": "junk" })).unwrap();
    let report = store.sweep_expired(0, |_| false).await.unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(backend.count().unwrap(), 1);
}

#[tokio::test]
async fn sweep_on_empty_store() {
    let (_, store) = memory_store();
    let report = store.sweep_expired(7, |_| false).await.unwrap();
    assert_eq!(report, SweepReport::default());
}
