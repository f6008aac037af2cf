//! SQLite-backed store.
//!
//! One table, `kv_records`, keyed by `(scope, key)`. Values are stored as
//! JSON text. The schema is applied inline via `include_str!` on open.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

use super::{KvStore, StoreError};

/// [`KvStore`] persisted to a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or the migration fails.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "failed to create store directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("trusted_schema", "OFF");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let migration_sql = include_str!("../../migrations/001_taskhive_schema.sql");
        sqlx::raw_sql(migration_sql).execute(&pool).await?;

        debug!(path = %path.display(), "sqlite store opened");
        Ok(Self { pool })
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn put(&self, scope: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO kv_records (scope, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope, key) DO UPDATE SET
                value = excluded.value,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .bind(scope)
        .bind(key)
        .bind(encoded)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, scope: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv_records WHERE scope = ?1 AND key = ?2")
                .bind(scope)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((encoded,)) => Ok(Some(serde_json::from_str(&encoded)?)),
            None => Ok(None),
        }
    }

    async fn list_keys(&self, scope: &str) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM kv_records WHERE scope = ?1")
            .bind(scope)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    async fn delete(&self, scope: &str, key: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM kv_records WHERE scope = ?1 AND key = ?2")
            .bind(scope)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("sqlite store closed");
    }
}
