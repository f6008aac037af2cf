//! Worker registry.
//!
//! Owns the worker records and their execution metrics behind a single
//! [`RwLock`]. Every operation on an unknown worker id reports a definite
//! "not found" (`false` / `None`) instead of an error: a heartbeat arriving
//! after unregistration is an expected race, not a fault.
//!
//! The registry never expires entries by itself. It exposes heartbeat
//! timestamps ([`WorkerRegistry::stale_workers`]) so the monitor can decide
//! when to demote a silent worker.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Worker, WorkerMetrics, WorkerStatus};

#[derive(Debug)]
struct WorkerEntry {
    worker: Worker,
    metrics: WorkerMetrics,
}

/// Registry of executors keyed by worker id.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerEntry>>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, WorkerEntry>> {
        self.workers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, WorkerEntry>> {
        self.workers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a worker and reset its metrics.
    ///
    /// A worker registered as `Busy` without a current task is stored as
    /// `Idle`; returns the previous record if one was replaced.
    pub fn register(&self, mut worker: Worker) -> Option<Worker> {
        if worker.status == WorkerStatus::Busy && worker.current_task.is_none() {
            worker.status = WorkerStatus::Idle;
        }
        if worker.status != WorkerStatus::Busy {
            worker.current_task = None;
        }
        let id = worker.id.clone();
        let previous = self.write().insert(
            id.clone(),
            WorkerEntry {
                worker,
                metrics: WorkerMetrics::default(),
            },
        );
        info!(worker_id = %id, replaced = previous.is_some(), "worker registered");
        previous.map(|entry| entry.worker)
    }

    /// Remove a worker, returning its last record.
    pub fn unregister(&self, id: &str) -> Option<Worker> {
        let removed = self.write().remove(id).map(|entry| entry.worker);
        if removed.is_some() {
            info!(worker_id = %id, "worker unregistered");
        }
        removed
    }

    /// Copy of a worker record.
    pub fn get(&self, id: &str) -> Option<Worker> {
        self.read().get(id).map(|entry| entry.worker.clone())
    }

    /// All workers, sorted by id.
    pub fn list(&self) -> Vec<Worker> {
        let mut workers: Vec<Worker> = self
            .read()
            .values()
            .map(|entry| entry.worker.clone())
            .collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }

    /// Number of registered workers.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no worker is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set a worker's status.
    ///
    /// Returns `false` for unknown ids, for `Busy` when the worker has no
    /// current task (use [`WorkerRegistry::assign`] instead), and for `Idle`
    /// while it still holds one (use [`WorkerRegistry::release`]). An
    /// `Offline` worker keeps its current task until it is released.
    pub fn update_status(&self, id: &str, status: WorkerStatus) -> bool {
        let mut workers = self.write();
        let Some(entry) = workers.get_mut(id) else {
            return false;
        };
        let holds_task = entry.worker.current_task.is_some();
        if status == WorkerStatus::Busy && !holds_task {
            return false;
        }
        if status == WorkerStatus::Idle && holds_task {
            return false;
        }
        entry.worker.status = status;
        debug!(worker_id = %id, status = %status, "worker status updated");
        true
    }

    /// Record a heartbeat at the current time.
    pub fn heartbeat(&self, id: &str) -> bool {
        self.heartbeat_at(id, Utc::now())
    }

    /// Record a heartbeat at `at`. The stored timestamp never moves backwards.
    ///
    /// An `Offline` worker that checks in again becomes `Busy` if it still
    /// holds a task, `Idle` otherwise.
    pub fn heartbeat_at(&self, id: &str, at: DateTime<Utc>) -> bool {
        let mut workers = self.write();
        let Some(entry) = workers.get_mut(id) else {
            return false;
        };
        let latest = entry.worker.last_heartbeat.map_or(at, |prev| prev.max(at));
        entry.worker.last_heartbeat = Some(latest);
        if entry.worker.status == WorkerStatus::Offline {
            entry.worker.status = if entry.worker.current_task.is_some() {
                WorkerStatus::Busy
            } else {
                WorkerStatus::Idle
            };
            info!(worker_id = %id, status = %entry.worker.status, "worker back online");
        }
        true
    }

    /// Move an idle worker to `Busy` on `task_id`. Fails for unknown or non-idle workers.
    pub fn assign(&self, id: &str, task_id: Uuid) -> bool {
        let mut workers = self.write();
        let Some(entry) = workers.get_mut(id) else {
            return false;
        };
        if entry.worker.status != WorkerStatus::Idle {
            return false;
        }
        entry.worker.status = WorkerStatus::Busy;
        entry.worker.current_task = Some(task_id);
        true
    }

    /// Return a busy worker to `Idle`, but only if it is still working on `task_id`.
    pub fn release(&self, id: &str, task_id: Uuid) -> bool {
        let mut workers = self.write();
        let Some(entry) = workers.get_mut(id) else {
            return false;
        };
        if entry.worker.current_task != Some(task_id) {
            return false;
        }
        entry.worker.current_task = None;
        if entry.worker.status == WorkerStatus::Busy {
            entry.worker.status = WorkerStatus::Idle;
        }
        true
    }

    /// Count a successful execution of `duration`.
    pub fn record_success(&self, id: &str, duration: Duration) -> bool {
        let mut workers = self.write();
        match workers.get_mut(id) {
            Some(entry) => {
                entry.metrics.record_success(duration);
                true
            }
            None => false,
        }
    }

    /// Count a failed execution.
    pub fn record_failure(&self, id: &str) -> bool {
        let mut workers = self.write();
        match workers.get_mut(id) {
            Some(entry) => {
                entry.metrics.record_failure();
                true
            }
            None => false,
        }
    }

    /// Accumulated metrics for a worker.
    pub fn metrics(&self, id: &str) -> Option<WorkerMetrics> {
        self.read().get(id).map(|entry| entry.metrics)
    }

    /// Idle workers, sorted by id.
    pub fn idle_workers(&self) -> Vec<Worker> {
        self.list()
            .into_iter()
            .filter(|worker| worker.status == WorkerStatus::Idle)
            .collect()
    }

    /// Ids of non-offline workers whose last heartbeat (or registration, if
    /// they never sent one) is older than `window` as of `now`.
    pub fn stale_workers(&self, window: Duration, now: DateTime<Utc>) -> Vec<String> {
        let Ok(window) = chrono::Duration::from_std(window) else {
            return Vec::new();
        };
        let Some(cutoff) = now.checked_sub_signed(window) else {
            return Vec::new();
        };
        let mut stale: Vec<String> = self
            .read()
            .values()
            .filter(|entry| entry.worker.status != WorkerStatus::Offline)
            .filter(|entry| {
                let seen = entry
                    .worker
                    .last_heartbeat
                    .unwrap_or(entry.worker.registered_at);
                seen < cutoff
            })
            .map(|entry| entry.worker.id.clone())
            .collect();
        stale.sort();
        stale
    }

    /// Number of workers in each status.
    pub fn counts_by_status(&self) -> BTreeMap<WorkerStatus, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.read().values() {
            let count = counts.entry(entry.worker.status).or_insert(0_usize);
            *count = count.saturating_add(1);
        }
        counts
    }
}
