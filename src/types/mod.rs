//! Core data model: tasks, workers and their lifecycle states.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Default task priority when the submitter does not set one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// Default task timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Opaque JSON object used for requirements, constraints, metadata and details.
pub type JsonMap = Map<String, Value>;

// ── Task ────────────────────────────────────────────────────────

/// Task lifecycle state.
///
/// ```text
/// Created ──► Rejected
///    │
///    ▼
/// Queued ──► Running ──► Completed | Failed | TimedOut | Cancelled
/// ```
///
/// `Cancelled` is also reachable from `Created` and `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Built from a submission, not yet screened.
    Created,
    /// Failed a safety rule. Terminal.
    Rejected,
    /// Waiting in the priority queue.
    Queued,
    /// Assigned to a worker.
    Running,
    /// Finished with a result. Terminal.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
    /// Exceeded its timeout while running. Terminal.
    TimedOut,
    /// Withdrawn by a caller. Terminal.
    Cancelled,
}

impl TaskStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [TaskStatus; 8] = [
        Self::Created,
        Self::Rejected,
        Self::Queued,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::TimedOut,
        Self::Cancelled,
    ];

    /// Whether no further transition is possible from this state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Created, Rejected)
                | (Created, Queued)
                | (Created, Cancelled)
                | (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Running, Cancelled)
        )
    }

    /// Stable snake_case name, as used on the wire and in config.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Rejected => "rejected",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid task status: {s}"))
    }
}

/// Parameters for a task submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// What the task should do. Must not be empty.
    pub description: String,
    /// Identity of the submitter.
    pub created_by: String,
    /// Higher is more urgent.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Opaque constraints on which worker may run the task.
    #[serde(default)]
    pub requirements: JsonMap,
    /// Opaque limits; may carry `safety_level` and `max_tokens`.
    #[serde(default)]
    pub constraints: JsonMap,
    /// Execution budget in seconds once running.
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,
    /// Free-form metadata such as tags or approval markers.
    #[serde(default)]
    pub metadata: JsonMap,
}

impl TaskRequest {
    /// Request with default priority, timeout and empty maps.
    pub fn new(description: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            created_by: created_by.into(),
            priority: DEFAULT_PRIORITY,
            requirements: JsonMap::new(),
            constraints: JsonMap::new(),
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            metadata: JsonMap::new(),
        }
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the timeout in seconds.
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Add a single constraint entry.
    pub fn with_constraint(mut self, key: &str, value: Value) -> Self {
        self.constraints.insert(key.to_owned(), value);
        self
    }

    /// Add a single requirement entry.
    pub fn with_requirement(mut self, key: &str, value: Value) -> Self {
        self.requirements.insert(key.to_owned(), value);
        self
    }

    /// Add a single metadata entry.
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_owned(), value);
        self
    }
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// A unit of requested work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, assigned once at creation.
    pub id: Uuid,
    /// What the task should do.
    pub description: String,
    /// Identity of the submitter.
    pub created_by: String,
    /// Higher is more urgent.
    pub priority: i32,
    /// Opaque worker requirements.
    pub requirements: JsonMap,
    /// Opaque limits.
    pub constraints: JsonMap,
    /// Execution budget in seconds once running.
    pub timeout_seconds: u64,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task entered `Running`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Worker executing the task; only set from `Running` onwards.
    pub assigned_worker: Option<String>,
    /// Result payload of a completed task.
    pub result: Option<Value>,
    /// Error message of a rejected, failed, timed out or cancelled task.
    pub error: Option<String>,
    /// Free-form mutable metadata.
    pub metadata: JsonMap,
}

impl Task {
    /// Build a fresh `Created` task from a submission.
    pub fn create(request: TaskRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: request.description,
            created_by: request.created_by,
            priority: request.priority,
            requirements: request.requirements,
            constraints: request.constraints,
            timeout_seconds: request.timeout_seconds,
            status: TaskStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            assigned_worker: None,
            result: None,
            error: None,
            metadata: request.metadata,
        }
    }

    /// Running time as of `now`, `None` if the task never started.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or(now);
        Some(end.signed_duration_since(started).to_std().unwrap_or_default())
    }

    /// Whether a running task has outlived its timeout as of `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        self.elapsed_at(now)
            .is_some_and(|elapsed| elapsed > Duration::from_secs(self.timeout_seconds))
    }
}

// ── Worker ──────────────────────────────────────────────────────

/// Worker availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Ready for a task.
    Idle,
    /// Executing a task.
    Busy,
    /// Not reachable; not eligible for assignment.
    Offline,
}

impl WorkerStatus {
    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A capability advertised by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCapability {
    /// Capability name, e.g. "code_generation".
    pub name: String,
    /// Broad grouping, e.g. "engineering".
    pub category: String,
    /// Languages the worker handles for this capability.
    #[serde(default)]
    pub supported_languages: Vec<String>,
    /// Upper bound on task complexity the worker accepts.
    #[serde(default)]
    pub max_complexity: Option<u32>,
}

impl WorkerCapability {
    /// Capability with no language or complexity restriction.
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            supported_languages: Vec::new(),
            max_complexity: None,
        }
    }
}

/// A registered executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Unique identifier.
    pub id: String,
    /// Identity that owns this worker.
    pub owner: String,
    /// Declared capabilities.
    pub capabilities: Vec<WorkerCapability>,
    /// Current availability.
    pub status: WorkerStatus,
    /// Task being executed; always set while `Busy`.
    pub current_task: Option<Uuid>,
    /// Last time the worker checked in.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// When the worker was registered.
    pub registered_at: DateTime<Utc>,
}

impl Worker {
    /// New idle worker with no heartbeat yet.
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        capabilities: Vec<WorkerCapability>,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            capabilities,
            status: WorkerStatus::Idle,
            current_task: None,
            last_heartbeat: None,
            registered_at: Utc::now(),
        }
    }

    /// Whether the worker advertises a capability with this name.
    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|cap| cap.name == name)
    }
}

/// Execution statistics accumulated per worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    /// Tasks finished successfully.
    pub completed: u64,
    /// Tasks that failed or timed out.
    pub failed: u64,
    /// Sum of successful execution durations.
    pub total_execution: Duration,
}

impl WorkerMetrics {
    /// Count a success and add its duration.
    pub fn record_success(&mut self, duration: Duration) {
        self.completed = self.completed.saturating_add(1);
        self.total_execution = self.total_execution.saturating_add(duration);
    }

    /// Count a failure.
    pub fn record_failure(&mut self) {
        self.failed = self.failed.saturating_add(1);
    }
}
