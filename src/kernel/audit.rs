//! Hash-chained audit log for consequential kernel actions.
//!
//! Each entry stores `hash = SHA-256(canonical JSON of {id, timestamp,
//! event_type, actor, details, prev_hash})`, where `prev_hash` is the hash of
//! the entry appended just before it (empty for the first). Canonical JSON
//! sorts object keys at every depth, so the digest does not depend on the
//! order in which `details` were built.
//!
//! Entries live in a [`KvStore`] scope keyed by entry id. The store may list
//! them in any order; readers sort by timestamp. Timestamps are kept strictly
//! increasing per log, so timestamp order is insertion order.
//!
//! Appends are linearized by the chain-tail lock, which is held across the
//! store write: two entries never claim the same predecessor, and a failed
//! write leaves the tail where it was.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{KvStore, StoreError};
use crate::types::JsonMap;

/// Audit event type names written by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditEventType {
    /// A submission failed admission screening.
    TaskRejected,
    /// A caller cancelled a task.
    TaskCancelled,
    /// A running task exceeded its timeout.
    TaskTimedOut,
    /// A worker was removed from the registry.
    WorkerUnregistered,
    /// A silent worker was demoted to offline.
    WorkerOffline,
    /// A task snapshot checkpoint was written.
    CheckpointCreated,
    /// The system was rolled back to a checkpoint.
    Rollback,
    /// A moderator banned a user.
    UserBanned,
    /// A moderator hid a piece of content.
    ContentHidden,
}

impl AuditEventType {
    /// Stable snake_case name stored in entries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskRejected => "task_rejected",
            Self::TaskCancelled => "task_cancelled",
            Self::TaskTimedOut => "task_timed_out",
            Self::WorkerUnregistered => "worker_unregistered",
            Self::WorkerOffline => "worker_offline",
            Self::CheckpointCreated => "checkpoint_created",
            Self::Rollback => "rollback",
            Self::UserBanned => "user_banned",
            Self::ContentHidden => "content_hidden",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AuditEventType> for String {
    fn from(event_type: AuditEventType) -> Self {
        event_type.as_str().to_owned()
    }
}

/// Audit log errors. Integrity problems are not errors; see [`IntegrityReport`].
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The backing store failed.
    #[error("audit store error: {0}")]
    Store(#[from] StoreError),

    /// An entry could not be encoded.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One immutable record in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry id; also the store key.
    pub id: Uuid,
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// Event type name, e.g. `task_rejected`.
    pub event_type: String,
    /// Who caused the event.
    pub actor: String,
    /// Opaque event details.
    pub details: JsonMap,
    /// Digest of this entry's fields and `prev_hash`.
    pub hash: String,
    /// Hash of the preceding entry; empty for the first.
    #[serde(default)]
    pub prev_hash: String,
}

impl AuditEntry {
    /// Recompute the digest from the recorded fields.
    pub fn compute_hash(&self) -> String {
        chain_hash(
            &self.id,
            &self.timestamp,
            &self.event_type,
            &self.actor,
            &self.details,
            &self.prev_hash,
        )
    }

    /// Whether the recorded hash matches the recorded fields.
    pub fn is_intact(&self) -> bool {
        self.compute_hash() == self.hash
    }
}

/// SHA-256 over the canonical JSON of an entry, hex encoded.
fn chain_hash(
    id: &Uuid,
    timestamp: &DateTime<Utc>,
    event_type: &str,
    actor: &str,
    details: &JsonMap,
    prev_hash: &str,
) -> String {
    // serde_json's default map is a BTreeMap, so keys serialize sorted at every depth.
    let payload = serde_json::json!({
        "id": id.to_string(),
        "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        "event_type": event_type,
        "actor": actor,
        "details": Value::Object(details.clone()),
        "prev_hash": prev_hash,
    });
    let canonical = payload.to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// A single problem found while walking the chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    /// The entry's content no longer matches its recorded hash.
    #[error("hash mismatch for entry {entry_id}")]
    HashMismatch {
        /// Tampered entry.
        entry_id: Uuid,
        /// Hash recomputed from the recorded fields.
        expected: String,
        /// Hash recorded on the entry.
        actual: String,
    },

    /// The entry does not point at the entry before it.
    #[error("broken hash chain at entry {entry_id}: expected prev {expected_prev:?}, got {actual_prev:?}")]
    BrokenLink {
        /// Entry whose link is wrong.
        entry_id: Uuid,
        /// Recorded hash of the preceding entry.
        expected_prev: String,
        /// `prev_hash` recorded on the entry.
        actual_prev: String,
    },

    /// A stored record could not be decoded as an entry.
    #[error("malformed audit record {key}: {reason}")]
    Malformed {
        /// Store key of the record.
        key: String,
        /// Decode failure.
        reason: String,
    },
}

/// Outcome of [`AuditLog::verify_integrity`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// `true` iff `errors` is empty.
    pub ok: bool,
    /// Number of entries walked.
    pub entries_checked: usize,
    /// Every mismatch, in chain order.
    pub errors: Vec<IntegrityError>,
}

impl IntegrityReport {
    /// Error messages only.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

#[derive(Debug, Default)]
struct ChainTail {
    hash: String,
    timestamp: Option<DateTime<Utc>>,
}

/// Append-only, hash-chained audit log.
pub struct AuditLog {
    store: Arc<dyn KvStore>,
    scope: String,
    tail: Mutex<ChainTail>,
}

impl fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLog")
            .field("scope", &self.scope)
            .field("store", &"<dyn KvStore>")
            .finish()
    }
}

impl AuditLog {
    /// Start a new chain in `scope`. Use [`AuditLog::open`] to continue an existing one.
    pub fn new(store: Arc<dyn KvStore>, scope: impl Into<String>) -> Self {
        Self {
            store,
            scope: scope.into(),
            tail: Mutex::new(ChainTail::default()),
        }
    }

    /// Continue the chain already stored in `scope`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn open(store: Arc<dyn KvStore>, scope: impl Into<String>) -> Result<Self, AuditError> {
        let log = Self::new(store, scope);
        let (entries, malformed) = log.load_entries().await?;
        if !malformed.is_empty() {
            warn!(scope = %log.scope, count = malformed.len(), "malformed audit records found on open");
        }
        if let Some(last) = entries.last() {
            let mut tail = log.tail.lock().await;
            tail.hash = last.hash.clone();
            tail.timestamp = Some(last.timestamp);
            info!(scope = %log.scope, entries = entries.len(), "audit chain resumed");
        }
        Ok(log)
    }

    /// Store scope holding the entries.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Hash of the most recent entry, empty if none.
    pub async fn tail_hash(&self) -> String {
        self.tail.lock().await.hash.clone()
    }

    /// Append an entry and advance the chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails; the chain is left unchanged.
    pub async fn append(
        &self,
        event_type: impl Into<String>,
        actor: impl Into<String>,
        details: JsonMap,
    ) -> Result<AuditEntry, AuditError> {
        let event_type = event_type.into();
        let actor = actor.into();

        let mut tail = self.tail.lock().await;

        let now = Utc::now();
        let timestamp = match tail.timestamp {
            Some(last) if now <= last => last
                .checked_add_signed(chrono::Duration::microseconds(1))
                .unwrap_or(now),
            _ => now,
        };

        let id = Uuid::new_v4();
        let hash = chain_hash(&id, &timestamp, &event_type, &actor, &details, &tail.hash);
        let entry = AuditEntry {
            id,
            timestamp,
            event_type,
            actor,
            details,
            hash,
            prev_hash: tail.hash.clone(),
        };

        let record = serde_json::to_value(&entry)?;
        self.store.put(&self.scope, &id.to_string(), &record).await?;

        tail.hash = entry.hash.clone();
        tail.timestamp = Some(entry.timestamp);
        debug!(entry_id = %id, event_type = %entry.event_type, "audit entry appended");
        Ok(entry)
    }

    /// Entries oldest first, optionally filtered by type, keeping the most recent `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list(
        &self,
        event_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let (entries, malformed) = self.load_entries().await?;
        for (key, reason) in &malformed {
            warn!(key = %key, reason = %reason, "skipping malformed audit record");
        }
        let mut matching: Vec<AuditEntry> = entries
            .into_iter()
            .filter(|entry| event_type.map_or(true, |wanted| entry.event_type == wanted))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.split_off(skip))
    }

    /// Walk the full chain and report every content or linkage mismatch.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store cannot be read; tampering is
    /// reported in the [`IntegrityReport`].
    pub async fn verify_integrity(&self) -> Result<IntegrityReport, AuditError> {
        let (entries, malformed) = self.load_entries().await?;

        let mut errors: Vec<IntegrityError> = malformed
            .into_iter()
            .map(|(key, reason)| IntegrityError::Malformed { key, reason })
            .collect();

        let mut previous_hash = String::new();
        for entry in &entries {
            let expected = entry.compute_hash();
            if expected != entry.hash {
                errors.push(IntegrityError::HashMismatch {
                    entry_id: entry.id,
                    expected,
                    actual: entry.hash.clone(),
                });
            }
            if entry.prev_hash != previous_hash {
                errors.push(IntegrityError::BrokenLink {
                    entry_id: entry.id,
                    expected_prev: previous_hash.clone(),
                    actual_prev: entry.prev_hash.clone(),
                });
            }
            previous_hash = entry.hash.clone();
        }

        if errors.is_empty() {
            debug!(entries = entries.len(), "audit chain verified");
        } else {
            warn!(entries = entries.len(), errors = errors.len(), "audit chain integrity violated");
        }

        Ok(IntegrityReport {
            ok: errors.is_empty(),
            entries_checked: entries.len(),
            errors,
        })
    }

    /// Every decodable entry sorted by timestamp, plus `(key, reason)` for the rest.
    async fn load_entries(&self) -> Result<(Vec<AuditEntry>, Vec<(String, String)>), AuditError> {
        let keys = self.store.list_keys(&self.scope).await?;
        let mut entries = Vec::with_capacity(keys.len());
        let mut malformed = Vec::new();

        for key in keys {
            let Some(record) = self.store.get(&self.scope, &key).await? else {
                continue;
            };
            match serde_json::from_value::<AuditEntry>(record) {
                Ok(entry) => entries.push(entry),
                Err(e) => malformed.push((key, e.to_string())),
            }
        }

        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        malformed.sort();
        Ok((entries, malformed))
    }
}
