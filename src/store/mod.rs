//! Key/value storage collaborator.
//!
//! The kernel treats persistence as an opaque store of JSON records keyed by
//! `(scope, key)`. Audit entries, task snapshots and checkpoints each live in
//! their own scope. Two backends ship with the crate:
//!
//! - [`MemoryStore`]: process-local, used by default and in tests
//! - [`SqliteStore`]: durable, backed by a single SQLite table
//!
//! Backends make no ordering promise for [`KvStore::list_keys`]; callers that
//! need an order must sort what they read.

mod memory;
mod sqlite;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::{StorageBackend, StorageConfig};

/// Errors surfaced by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend is not usable (closed, misconfigured, unreachable).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Opaque JSON key/value store scoped by a logical namespace.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Insert or replace the record at `(scope, key)`.
    async fn put(&self, scope: &str, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Fetch the record at `(scope, key)`, `None` if absent.
    async fn get(&self, scope: &str, key: &str) -> Result<Option<Value>, StoreError>;

    /// All keys in `scope`, in no particular order.
    async fn list_keys(&self, scope: &str) -> Result<Vec<String>, StoreError>;

    /// Remove the record at `(scope, key)`; returns whether it existed.
    async fn delete(&self, scope: &str, key: &str) -> Result<bool, StoreError>;

    /// Release backend resources, waiting for in-flight writes. Later calls
    /// may fail. The default does nothing.
    async fn close(&self) {}
}

/// Build the store selected by configuration.
///
/// # Errors
///
/// Returns an error if the SQLite database cannot be opened or migrated.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn KvStore>, StoreError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::Sqlite => {
            let store = SqliteStore::open(Path::new(&config.sqlite_path)).await?;
            Ok(Arc::new(store))
        }
    }
}
