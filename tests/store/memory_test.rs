//! Tests for `src/store/memory.rs`.

use serde_json::json;
use taskhive::store::{KvStore, MemoryStore};

#[tokio::test]
async fn scopes_are_isolated() {
    let store = MemoryStore::new();
    store.put("tasks", "k", &json!(1)).await.expect("put");
    store.put("audit", "k", &json!(2)).await.expect("put");

    assert_eq!(store.get("tasks", "k").await.expect("get"), Some(json!(1)));
    assert_eq!(store.get("audit", "k").await.expect("get"), Some(json!(2)));
    assert_eq!(store.len("tasks"), 1);
    assert!(store.is_empty("checkpoints"));
}

#[tokio::test]
async fn put_replaces_and_delete_reports_presence() {
    let store = MemoryStore::new();
    store.put("tasks", "k", &json!("old")).await.expect("put");
    store.put("tasks", "k", &json!("new")).await.expect("put");
    assert_eq!(store.get("tasks", "k").await.expect("get"), Some(json!("new")));

    assert!(store.delete("tasks", "k").await.expect("delete"));
    assert!(!store.delete("tasks", "k").await.expect("delete"));
    assert_eq!(store.get("tasks", "k").await.expect("get"), None);
    assert!(store.list_keys("tasks").await.expect("keys").is_empty());
}
