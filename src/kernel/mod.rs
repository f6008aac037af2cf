//! Task kernel: submission, dispatch, worker lifecycle and audit.
//!
//! [`Kernel`] owns the task table, the priority queue, the worker registry,
//! the safety validator, the audit log and the event bus, and is the only
//! place that moves tasks between them. Every status change goes through the
//! task table's state machine, so racing callers resolve to one winner.

pub mod audit;
pub mod events;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod router;
pub mod safety;
pub mod tasks;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TaskhiveConfig;
use crate::store::{self, KvStore, StoreError};
use crate::types::{JsonMap, Task, TaskRequest, TaskStatus, Worker, WorkerMetrics, WorkerStatus};

use self::audit::{AuditEntry, AuditError, AuditEventType, AuditLog, IntegrityReport};
use self::events::EventBus;
use self::monitor::{MonitorDeps, SweepReport, TimeoutMonitor};
use self::queue::PriorityTaskQueue;
use self::registry::WorkerRegistry;
use self::router::{CapabilityRouter, TaskRouter};
use self::safety::{SafetyError, SafetyValidator};
use self::tasks::{TaskTable, TransitionOutcome};

/// Store scope holding task snapshots, keyed by task id.
pub const TASKS_SCOPE: &str = "tasks";

/// Store scope holding checkpoints, keyed by checkpoint id.
pub const CHECKPOINTS_SCOPE: &str = "checkpoints";

/// Metadata key listing every safety violation of a rejected task.
pub const SAFETY_VIOLATIONS_KEY: &str = "safety_violations";

/// Actor recorded for audit entries the kernel writes on its own behalf.
pub const KERNEL_ACTOR: &str = "kernel";

const KERNEL_SOURCE: &str = "kernel";

/// Kernel operation errors.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The submission is malformed (empty description, zero timeout).
    #[error("invalid task request: {0}")]
    InvalidRequest(String),
    /// The key/value store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The audit log could not be written or read.
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),
    /// The safety rules could not be built from configuration.
    #[error("safety configuration error: {0}")]
    Safety(#[from] SafetyError),
    /// A snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of a cancellation request.
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// The task is now `Cancelled`.
    Cancelled(Task),
    /// No task with that id.
    NotFound,
    /// The task had already reached this terminal status.
    AlreadyFinished(TaskStatus),
}

/// A task handed to a worker by [`Kernel::dispatch_next`].
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// The task, now `Running`.
    pub task: Task,
    /// Worker that received it.
    pub worker_id: String,
}

/// Aggregate counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelStats {
    /// Task count per status; statuses with no tasks are omitted.
    pub tasks_by_status: BTreeMap<TaskStatus, usize>,
    /// Total tasks tracked.
    pub total_tasks: usize,
    /// Worker count per status; statuses with no workers are omitted.
    pub workers_by_status: BTreeMap<WorkerStatus, usize>,
    /// Total registered workers.
    pub total_workers: usize,
    /// Tasks currently waiting in the queue.
    pub queue_depth: usize,
    /// Live event subscriptions.
    pub subscribers: usize,
    /// Seconds since the kernel was built.
    pub uptime_seconds: u64,
}

/// Summary of a stored checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint id, also its key in the `checkpoints` scope.
    pub id: Uuid,
    /// When it was taken.
    pub created_at: DateTime<Utc>,
    /// Number of tasks captured.
    pub task_count: usize,
    /// Number of those tasks that were queued.
    pub queue_depth: usize,
}

/// Full content of a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Checkpoint id.
    pub id: Uuid,
    /// When it was taken.
    pub created_at: DateTime<Utc>,
    /// Every task the kernel tracked, newest first.
    pub tasks: Vec<Task>,
    /// Ids of queued tasks, in dequeue order.
    pub queued: Vec<Uuid>,
    /// Registered workers, sorted by id.
    pub workers: Vec<Worker>,
}

impl CheckpointState {
    fn summary(&self) -> Checkpoint {
        Checkpoint {
            id: self.id,
            created_at: self.created_at,
            task_count: self.tasks.len(),
            queue_depth: self.queued.len(),
        }
    }
}

/// The task kernel.
pub struct Kernel {
    config: TaskhiveConfig,
    store: Arc<dyn KvStore>,
    tasks: Arc<TaskTable>,
    queue: PriorityTaskQueue,
    registry: Arc<WorkerRegistry>,
    safety: SafetyValidator,
    audit: Arc<AuditLog>,
    events: Arc<EventBus>,
    router: Arc<dyn TaskRouter>,
    monitor: TimeoutMonitor,
    monitor_deps: Arc<MonitorDeps>,
    started: Instant,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("tasks", &self.tasks.len())
            .field("queue_depth", &self.queue.size())
            .field("workers", &self.registry.len())
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl Kernel {
    /// Build a kernel over `store`, resuming the audit chain it already holds.
    ///
    /// # Errors
    ///
    /// Returns an error if a prohibited pattern does not compile or the
    /// audit chain cannot be read.
    pub async fn new(config: TaskhiveConfig, store: Arc<dyn KvStore>) -> Result<Self, KernelError> {
        let safety = SafetyValidator::from_config(&config.safety)?;
        let audit = Arc::new(AuditLog::open(Arc::clone(&store), config.audit.scope.clone()).await?);
        let events = Arc::new(EventBus::new(config.events.handler_timeout()));
        let tasks = Arc::new(TaskTable::new());
        let registry = Arc::new(WorkerRegistry::new());
        let monitor_deps = Arc::new(MonitorDeps {
            tasks: Arc::clone(&tasks),
            registry: Arc::clone(&registry),
            audit: Arc::clone(&audit),
            events: Arc::clone(&events),
            worker_liveness: config.kernel.worker_liveness(),
        });
        let monitor = TimeoutMonitor::new(config.kernel.monitor_interval());

        info!(
            rules = safety.rules().len(),
            audit_scope = %audit.scope(),
            "kernel initialised"
        );

        Ok(Self {
            config,
            store,
            tasks,
            queue: PriorityTaskQueue::new(),
            registry,
            safety,
            audit,
            events,
            router: Arc::new(CapabilityRouter),
            monitor,
            monitor_deps,
            started: Instant::now(),
        })
    }

    /// Build a kernel over the store selected by `config.storage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened, or as [`Kernel::new`].
    pub async fn open(config: TaskhiveConfig) -> Result<Self, KernelError> {
        let store = store::open_store(&config.storage).await?;
        Self::new(config, store).await
    }

    /// Replace the routing policy used by [`Kernel::dispatch_next`].
    pub fn with_router(mut self, router: Arc<dyn TaskRouter>) -> Self {
        self.router = router;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &TaskhiveConfig {
        &self.config
    }

    /// Event bus for subscriptions.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Worker registry.
    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Start the scheduling monitor. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let started = self.monitor.start(Arc::clone(&self.monitor_deps));
        if started {
            info!(
                interval_ms = self.config.kernel.monitor_interval_ms,
                "kernel started"
            );
            self.publish("kernel_started", json!({}));
        }
        started
    }

    /// Stop the scheduling monitor and wait for it to finish.
    ///
    /// Returns `false` if it was not running.
    pub async fn stop(&self) -> bool {
        let stopped = self.monitor.stop().await;
        if stopped {
            info!("kernel stopped");
            self.publish("kernel_stopped", json!({}));
        }
        stopped
    }

    /// Stop the monitor, let event handlers drain, then close the store.
    ///
    /// Subscribers still see `kernel_stopped`. The kernel must not be used
    /// afterwards.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.events.shutdown().await;
        self.store.close().await;
        info!("kernel shut down");
    }

    /// Whether the scheduling monitor is running.
    pub fn is_running(&self) -> bool {
        self.monitor.is_running()
    }

    /// Run one monitor pass immediately as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        monitor::sweep(&self.monitor_deps, now).await
    }

    // ── Tasks ───────────────────────────────────────────────────

    /// Screen and enqueue a task.
    ///
    /// A task that breaks a safety rule is returned as `Ok` with status
    /// `Rejected`, `error` set to the first violation, and every violation
    /// listed under the `safety_violations` metadata key. The task snapshot
    /// is stored before the task becomes visible; if that write fails
    /// nothing is changed.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty description or a zero timeout, or if
    /// the snapshot or audit write fails.
    pub async fn submit_task(&self, request: TaskRequest) -> Result<Task, KernelError> {
        if request.description.trim().is_empty() {
            return Err(KernelError::InvalidRequest(
                "description must not be empty".into(),
            ));
        }
        if request.timeout_seconds == 0 {
            return Err(KernelError::InvalidRequest(
                "timeout_seconds must be at least 1".into(),
            ));
        }

        let mut task = Task::create(request);
        let report = self.safety.validate(&task);

        if !report.approved {
            return self.reject(task, report.messages()).await;
        }

        task.status = TaskStatus::Queued;
        self.save_snapshot(&task).await?;
        self.tasks.insert(task.clone());
        self.enqueue_live(task.clone());

        info!(
            task_id = %task.id,
            priority = task.priority,
            created_by = %task.created_by,
            "task queued"
        );
        self.publish(
            "task_submitted",
            json!({
                "task_id": task.id,
                "priority": task.priority,
                "created_by": task.created_by,
            }),
        );
        Ok(task)
    }

    async fn reject(&self, mut task: Task, violations: Vec<String>) -> Result<Task, KernelError> {
        let reason = violations
            .first()
            .cloned()
            .unwrap_or_else(|| "rejected by safety policy".to_owned());
        task.status = TaskStatus::Rejected;
        task.completed_at = Some(Utc::now());
        task.error = Some(reason.clone());
        task.metadata
            .insert(SAFETY_VIOLATIONS_KEY.into(), json!(violations));

        self.save_snapshot(&task).await?;

        let mut details = JsonMap::new();
        details.insert("task_id".into(), json!(task.id));
        details.insert("reason".into(), json!(reason));
        details.insert("violations".into(), json!(violations));
        if let Err(e) = self
            .audit
            .append(AuditEventType::TaskRejected, task.created_by.clone(), details)
            .await
        {
            if let Err(cleanup) = self.store.delete(TASKS_SCOPE, &task.id.to_string()).await {
                warn!(task_id = %task.id, error = %cleanup, "failed to drop snapshot of unaudited rejection");
            }
            return Err(e.into());
        }

        self.tasks.insert(task.clone());
        warn!(task_id = %task.id, reason = %reason, "task rejected");
        self.publish(
            "task_rejected",
            json!({
                "task_id": task.id,
                "reason": reason,
                "violations": violations,
            }),
        );
        Ok(task)
    }

    async fn save_snapshot(&self, task: &Task) -> Result<(), KernelError> {
        let record = serde_json::to_value(task)?;
        self.store
            .put(TASKS_SCOPE, &task.id.to_string(), &record)
            .await?;
        Ok(())
    }

    /// Current record of a task.
    pub fn get_task(&self, id: &Uuid) -> Option<Task> {
        self.tasks.get(id)
    }

    /// Tasks, optionally filtered by status, newest first.
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        self.tasks.list(status)
    }

    /// Cancel a task that has not finished.
    ///
    /// A queued task is withdrawn from the queue; a running task frees its
    /// worker. Exactly one of a racing cancel and dispatch wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the audit write fails; the cancellation itself
    /// has already been applied.
    pub async fn cancel_task(&self, id: &Uuid) -> Result<CancelOutcome, KernelError> {
        let withdrawn = self.queue.remove(id).is_some();

        let outcome = self.tasks.transition(id, TaskStatus::Cancelled, |t| {
            t.error = Some("cancelled".into());
        });
        let task = match outcome {
            TransitionOutcome::Applied(task) => task,
            TransitionOutcome::NotFound => return Ok(CancelOutcome::NotFound),
            TransitionOutcome::Refused { current } => {
                return Ok(CancelOutcome::AlreadyFinished(current));
            }
        };

        if let Some(worker_id) = task.assigned_worker.as_deref() {
            self.registry.release(worker_id, task.id);
        }
        info!(task_id = %id, withdrawn, "task cancelled");

        let mut details = JsonMap::new();
        details.insert("task_id".into(), json!(task.id));
        details.insert("worker_id".into(), json!(task.assigned_worker));
        self.audit
            .append(AuditEventType::TaskCancelled, KERNEL_ACTOR, details)
            .await?;

        self.publish(
            "task_cancelled",
            json!({ "task_id": task.id, "worker_id": task.assigned_worker }),
        );
        Ok(CancelOutcome::Cancelled(task))
    }

    /// Hand the most urgent queued task to a worker chosen by the router.
    ///
    /// Returns `None` when no worker is idle, the queue is empty, or the
    /// router declines; a declined task stays queued. Tasks cancelled while
    /// being dispatched are skipped.
    pub async fn dispatch_next(&self) -> Option<Assignment> {
        loop {
            let candidates = self.registry.idle_workers();
            if candidates.is_empty() {
                return None;
            }
            let task = self.queue.dequeue()?;

            let chosen = self
                .router
                .route(&task, &candidates)
                .await
                .filter(|id| candidates.iter().any(|w| &w.id == id));
            let Some(worker_id) = chosen else {
                debug!(task_id = %task.id, "no worker accepted task, leaving it queued");
                self.enqueue_live(task);
                return None;
            };

            if !self.registry.assign(&worker_id, task.id) {
                debug!(task_id = %task.id, worker_id = %worker_id, "worker no longer idle, requeueing");
                self.enqueue_live(task);
                continue;
            }

            let outcome = self.tasks.transition(&task.id, TaskStatus::Running, |t| {
                t.assigned_worker = Some(worker_id.clone());
            });
            match outcome {
                TransitionOutcome::Applied(task) => {
                    info!(task_id = %task.id, worker_id = %worker_id, "task assigned");
                    self.publish(
                        "task_assigned",
                        json!({ "task_id": task.id, "worker_id": worker_id }),
                    );
                    return Some(Assignment { task, worker_id });
                }
                TransitionOutcome::NotFound | TransitionOutcome::Refused { .. } => {
                    self.registry.release(&worker_id, task.id);
                    debug!(task_id = %task.id, "task cancelled during dispatch, skipping");
                }
            }
        }
    }

    /// Queue a task the table already holds.
    fn enqueue_live(&self, task: Task) {
        let id = task.id;
        self.queue.enqueue(task);
        // A cancel that ran while the task was outside the queue must not leave it behind.
        if self.tasks.get(&id).is_some_and(|t| t.status.is_terminal()) {
            self.queue.remove(&id);
        }
    }

    /// Record a running task's result and free its worker.
    pub fn complete_task(&self, id: &Uuid, result: Value) -> TransitionOutcome {
        let outcome = self.tasks.transition(id, TaskStatus::Completed, |t| {
            t.result = Some(result);
            t.error = None;
        });
        if let TransitionOutcome::Applied(task) = &outcome {
            if let Some(worker_id) = task.assigned_worker.as_deref() {
                self.registry.release(worker_id, task.id);
                let elapsed = task.elapsed_at(Utc::now()).unwrap_or(Duration::ZERO);
                self.registry.record_success(worker_id, elapsed);
            }
            info!(task_id = %task.id, "task completed");
            self.publish(
                "task_completed",
                json!({ "task_id": task.id, "worker_id": task.assigned_worker }),
            );
        }
        outcome
    }

    /// Record a running task's failure and free its worker.
    pub fn fail_task(&self, id: &Uuid, error: impl Into<String>) -> TransitionOutcome {
        let error = error.into();
        let outcome = self.tasks.transition(id, TaskStatus::Failed, |t| {
            t.error = Some(error.clone());
            t.result = None;
        });
        if let TransitionOutcome::Applied(task) = &outcome {
            if let Some(worker_id) = task.assigned_worker.as_deref() {
                self.registry.release(worker_id, task.id);
                self.registry.record_failure(worker_id);
            }
            warn!(task_id = %task.id, error = %error, "task failed");
            self.publish(
                "task_failed",
                json!({
                    "task_id": task.id,
                    "worker_id": task.assigned_worker,
                    "error": error,
                }),
            );
        }
        outcome
    }

    // ── Workers ─────────────────────────────────────────────────

    /// Register or replace a worker; returns the replaced record.
    pub fn register_worker(&self, worker: Worker) -> Option<Worker> {
        let id = worker.id.clone();
        let capabilities: Vec<String> = worker.capabilities.iter().map(|c| c.name.clone()).collect();
        let previous = self.registry.register(worker);
        self.publish(
            "worker_registered",
            json!({ "worker_id": id, "capabilities": capabilities }),
        );
        previous
    }

    /// Remove a worker. Returns `Ok(false)` if it was not registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the audit write fails; the worker is already removed.
    pub async fn unregister_worker(&self, id: &str) -> Result<bool, KernelError> {
        let Some(worker) = self.registry.unregister(id) else {
            return Ok(false);
        };

        let mut details = JsonMap::new();
        details.insert("worker_id".into(), json!(worker.id));
        details.insert("owner".into(), json!(worker.owner));
        details.insert("current_task".into(), json!(worker.current_task));
        self.audit
            .append(AuditEventType::WorkerUnregistered, worker.owner.clone(), details)
            .await?;

        self.publish("worker_unregistered", json!({ "worker_id": worker.id }));
        Ok(true)
    }

    /// Record a heartbeat. Returns `false` for unknown workers.
    pub fn heartbeat(&self, id: &str) -> bool {
        self.registry.heartbeat(id)
    }

    /// Copy of a worker record.
    pub fn get_worker(&self, id: &str) -> Option<Worker> {
        self.registry.get(id)
    }

    /// All workers, sorted by id.
    pub fn list_workers(&self) -> Vec<Worker> {
        self.registry.list()
    }

    /// Execution metrics of a worker.
    pub fn worker_metrics(&self, id: &str) -> Option<WorkerMetrics> {
        self.registry.metrics(id)
    }

    // ── Stats ───────────────────────────────────────────────────

    /// Aggregate counters.
    pub fn stats(&self) -> KernelStats {
        let tasks_by_status = self.tasks.counts_by_status();
        let workers_by_status = self.registry.counts_by_status();
        KernelStats {
            total_tasks: tasks_by_status.values().copied().fold(0_usize, usize::saturating_add),
            total_workers: workers_by_status.values().copied().fold(0_usize, usize::saturating_add),
            tasks_by_status,
            workers_by_status,
            queue_depth: self.queue.size(),
            subscribers: self.events.subscriber_count(),
            uptime_seconds: self.started.elapsed().as_secs(),
        }
    }

    // ── Audit ───────────────────────────────────────────────────

    /// Append a caller-supplied audit entry (bans, content hides, ...).
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn append_audit_event(
        &self,
        event_type: impl Into<String>,
        actor: impl Into<String>,
        details: JsonMap,
    ) -> Result<AuditEntry, KernelError> {
        Ok(self.audit.append(event_type, actor, details).await?)
    }

    /// Most recent audit entries, oldest first, optionally filtered by type.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list_audit_events(
        &self,
        event_type: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, KernelError> {
        Ok(self.audit.list(event_type, limit).await?)
    }

    /// Verify the whole audit chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn verify_audit_integrity(&self) -> Result<IntegrityReport, KernelError> {
        Ok(self.audit.verify_integrity().await?)
    }

    // ── Checkpoints ─────────────────────────────────────────────

    /// Store a snapshot of every task and worker.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot or audit write fails.
    pub async fn create_checkpoint(&self) -> Result<Checkpoint, KernelError> {
        let state = CheckpointState {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            tasks: self.tasks.list(None),
            queued: self.queue.snapshot().iter().map(|t| t.id).collect(),
            workers: self.registry.list(),
        };
        let summary = state.summary();

        let record = serde_json::to_value(&state)?;
        self.store
            .put(CHECKPOINTS_SCOPE, &state.id.to_string(), &record)
            .await?;

        let mut details = JsonMap::new();
        details.insert("checkpoint_id".into(), json!(summary.id));
        details.insert("task_count".into(), json!(summary.task_count));
        details.insert("queue_depth".into(), json!(summary.queue_depth));
        self.audit
            .append(AuditEventType::CheckpointCreated, KERNEL_ACTOR, details)
            .await?;

        info!(checkpoint_id = %summary.id, tasks = summary.task_count, "checkpoint created");
        self.publish("checkpoint_created", json!(summary));
        Ok(summary)
    }

    /// Load a checkpoint and announce a rollback to it.
    ///
    /// Live queue and task state is left as is; subscribers to
    /// `system_rollback` decide what to restore. Returns `None` for an
    /// unknown checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read, the record does not
    /// decode, or the audit write fails.
    pub async fn rollback_to_checkpoint(
        &self,
        id: &Uuid,
    ) -> Result<Option<CheckpointState>, KernelError> {
        let Some(record) = self.store.get(CHECKPOINTS_SCOPE, &id.to_string()).await? else {
            return Ok(None);
        };
        let state: CheckpointState = serde_json::from_value(record)?;

        let mut details = JsonMap::new();
        details.insert("checkpoint_id".into(), json!(state.id));
        details.insert("checkpoint_created_at".into(), json!(state.created_at));
        self.audit
            .append(AuditEventType::Rollback, KERNEL_ACTOR, details)
            .await?;

        warn!(checkpoint_id = %state.id, "rollback requested");
        self.publish("system_rollback", json!(state.summary()));
        Ok(Some(state))
    }

    /// Summaries of stored checkpoints, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, KernelError> {
        let mut checkpoints = Vec::new();
        for key in self.store.list_keys(CHECKPOINTS_SCOPE).await? {
            let Some(record) = self.store.get(CHECKPOINTS_SCOPE, &key).await? else {
                continue;
            };
            match serde_json::from_value::<CheckpointState>(record) {
                Ok(state) => checkpoints.push(state.summary()),
                Err(e) => warn!(key = %key, error = %e, "skipping malformed checkpoint"),
            }
        }
        checkpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(checkpoints)
    }

    fn publish(&self, topic: &str, payload: Value) -> usize {
        self.events.publish(topic, payload, KERNEL_SOURCE)
    }
}
