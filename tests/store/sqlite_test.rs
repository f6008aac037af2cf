//! Tests for `src/store/sqlite.rs`.

use std::sync::Arc;

use serde_json::json;
use taskhive::config::{StorageBackend, StorageConfig, TaskhiveConfig};
use taskhive::kernel::audit::AuditLog;
use taskhive::kernel::{Kernel, TASKS_SCOPE};
use taskhive::store::{open_store, KvStore, SqliteStore};
use taskhive::types::{JsonMap, TaskRequest};

#[tokio::test]
async fn round_trips_json_records() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let store = SqliteStore::open(&tmp.path().join("kv.db"))
        .await
        .expect("open");

    let record = json!({ "status": "queued", "nested": { "b": [1, 2], "a": null } });
    store.put("tasks", "t1", &record).await.expect("put");
    assert_eq!(store.get("tasks", "t1").await.expect("get"), Some(record));
    assert_eq!(store.get("tasks", "missing").await.expect("get"), None);

    store.put("tasks", "t1", &json!("replaced")).await.expect("put");
    assert_eq!(
        store.get("tasks", "t1").await.expect("get"),
        Some(json!("replaced"))
    );
    store.close().await;
}

#[tokio::test]
async fn list_and_delete_are_scoped() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let store = SqliteStore::open(&tmp.path().join("kv.db"))
        .await
        .expect("open");

    store.put("audit", "a", &json!(1)).await.expect("put");
    store.put("audit", "b", &json!(2)).await.expect("put");
    store.put("tasks", "a", &json!(3)).await.expect("put");

    let mut keys = store.list_keys("audit").await.expect("keys");
    keys.sort();
    assert_eq!(keys, vec!["a".to_owned(), "b".to_owned()]);

    assert!(store.delete("audit", "a").await.expect("delete"));
    assert!(!store.delete("audit", "a").await.expect("delete"));
    assert_eq!(store.get("tasks", "a").await.expect("get"), Some(json!(3)));
    store.close().await;
}

#[tokio::test]
async fn creates_missing_parent_directories() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("nested").join("dir").join("kv.db");
    let store = SqliteStore::open(&path).await.expect("open");
    assert!(path.exists());
    store.close().await;
}

#[tokio::test]
async fn audit_chain_survives_reopen() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let config = StorageConfig {
        backend: StorageBackend::Sqlite,
        sqlite_path: tmp.path().join("audit.db").display().to_string(),
    };

    let first_hash = {
        let store = open_store(&config).await.expect("open");
        let log = AuditLog::open(Arc::clone(&store), "audit").await.expect("log");
        let mut details = JsonMap::new();
        details.insert("content_id".into(), json!("post-9"));
        log.append("content_hidden", "moderator", details)
            .await
            .expect("append")
            .hash
    };

    let store = open_store(&config).await.expect("reopen");
    let log = AuditLog::open(store, "audit").await.expect("log");
    assert_eq!(log.tail_hash().await, first_hash);

    let next = log
        .append("user_banned", "moderator", JsonMap::new())
        .await
        .expect("append");
    assert_eq!(next.prev_hash, first_hash);

    let report = log.verify_integrity().await.expect("verify");
    assert!(report.ok, "{:?}", report.messages());
    assert_eq!(report.entries_checked, 2);
}

#[tokio::test]
async fn kernel_shutdown_closes_the_store() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let path = tmp.path().join("kernel.db");
    let store: Arc<dyn KvStore> = Arc::new(SqliteStore::open(&path).await.expect("open"));
    let kernel = Kernel::new(TaskhiveConfig::default(), Arc::clone(&store))
        .await
        .expect("kernel");
    let task = kernel
        .submit_task(TaskRequest::new("persist me", "alice"))
        .await
        .expect("submit");
    assert!(kernel.start());

    kernel.shutdown().await;
    assert!(!kernel.is_running());
    assert!(store.put(TASKS_SCOPE, "late", &json!(1)).await.is_err());

    let reopened = SqliteStore::open(&path).await.expect("reopen");
    let snapshot = reopened
        .get(TASKS_SCOPE, &task.id.to_string())
        .await
        .expect("get");
    assert!(snapshot.is_some());
    reopened.close().await;
}
