//! In-process store.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{KvStore, StoreError};

/// [`KvStore`] held entirely in memory.
///
/// Uses a sync [`Mutex`] since the critical section is brief (no awaits).
#[derive(Debug, Default)]
pub struct MemoryStore {
    scopes: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in `scope`.
    pub fn len(&self, scope: &str) -> usize {
        let scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes.get(scope).map_or(0, HashMap::len)
    }

    /// Whether `scope` holds no records.
    pub fn is_empty(&self, scope: &str) -> bool {
        self.len(scope) == 0
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn put(&self, scope: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        scopes
            .entry(scope.to_owned())
            .or_default()
            .insert(key.to_owned(), value.clone());
        Ok(())
    }

    async fn get(&self, scope: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(scopes.get(scope).and_then(|records| records.get(key)).cloned())
    }

    async fn list_keys(&self, scope: &str) -> Result<Vec<String>, StoreError> {
        let scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(scopes
            .get(scope)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, scope: &str, key: &str) -> Result<bool, StoreError> {
        let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(scopes
            .get_mut(scope)
            .is_some_and(|records| records.remove(key).is_some()))
    }
}
