//! Task table: the authoritative record of every task the kernel has seen.
//!
//! All status changes go through [`TaskTable::transition`], which applies the
//! lifecycle state machine under the table lock. Two racing callers (a cancel
//! and a dispatch, a completion and a timeout) can therefore never both win:
//! the loser sees [`TransitionOutcome::Refused`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{Task, TaskStatus};

/// Result of a requested status change.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The change was applied; carries the updated task.
    Applied(Task),
    /// No task with that id.
    NotFound,
    /// The state machine does not allow the change from `current`.
    Refused {
        /// Status the task was in.
        current: TaskStatus,
    },
}

impl TransitionOutcome {
    /// The updated task, if the change was applied.
    pub fn applied(self) -> Option<Task> {
        match self {
            Self::Applied(task) => Some(task),
            _ => None,
        }
    }

    /// Whether the change was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Thread-safe map of task id to task.
#[derive(Debug, Default)]
pub struct TaskTable {
    tasks: Mutex<HashMap<Uuid, Task>>,
}

impl TaskTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a task.
    pub fn insert(&self, task: Task) {
        self.lock().insert(task.id, task);
    }

    /// Copy of a task.
    pub fn get(&self, id: &Uuid) -> Option<Task> {
        self.lock().get(id).cloned()
    }

    /// Tasks, optionally filtered by status, newest first.
    pub fn list(&self, status: Option<TaskStatus>) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .lock()
            .values()
            .filter(|task| status.map_or(true, |wanted| wanted == task.status))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Number of tasks tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Running tasks that have outlived their timeout as of `now`.
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<Task> {
        self.lock()
            .values()
            .filter(|task| task.is_overdue(now))
            .cloned()
            .collect()
    }

    /// Number of tasks in each status.
    pub fn counts_by_status(&self) -> BTreeMap<TaskStatus, usize> {
        let mut counts = BTreeMap::new();
        for task in self.lock().values() {
            let count = counts.entry(task.status).or_insert(0_usize);
            *count = count.saturating_add(1);
        }
        counts
    }

    /// Move a task to `next` if the state machine allows it.
    ///
    /// Sets `started_at` on entering `Running` and `completed_at` on entering
    /// a terminal state, then lets `update` fill in the rest (worker, result,
    /// error) while the lock is still held.
    pub fn transition(
        &self,
        id: &Uuid,
        next: TaskStatus,
        update: impl FnOnce(&mut Task),
    ) -> TransitionOutcome {
        self.transition_at(id, next, Utc::now(), update)
    }

    /// [`TaskTable::transition`] with an explicit clock.
    pub fn transition_at(
        &self,
        id: &Uuid,
        next: TaskStatus,
        now: DateTime<Utc>,
        update: impl FnOnce(&mut Task),
    ) -> TransitionOutcome {
        let mut tasks = self.lock();
        let Some(task) = tasks.get_mut(id) else {
            return TransitionOutcome::NotFound;
        };
        if !task.status.can_transition_to(next) {
            return TransitionOutcome::Refused {
                current: task.status,
            };
        }
        task.status = next;
        if next == TaskStatus::Running {
            task.started_at = Some(now);
        }
        if next.is_terminal() {
            task.completed_at = Some(now);
        }
        update(task);
        TransitionOutcome::Applied(task.clone())
    }
}
