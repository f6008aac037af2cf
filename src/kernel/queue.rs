//! Priority task queue.
//!
//! Tasks are ordered by descending priority, then by ascending creation time,
//! then by insertion order. The order is a strict total order, so dequeue
//! results are fully determined by the sequence of linearized enqueues.
//!
//! All operations take one mutex for a short, await-free critical section,
//! which makes each of them atomic with respect to the others: a task is
//! handed out by at most one `dequeue`, and a task withdrawn by `remove` is
//! never dequeued afterwards.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::types::{Task, TaskStatus};

/// Sort key: highest priority first, then oldest, then first inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<i32>,
    created_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    order: BTreeMap<QueueKey, Uuid>,
    tasks: HashMap<Uuid, (QueueKey, Task)>,
    next_seq: u64,
}

/// Thread-safe priority queue of tasks awaiting execution.
#[derive(Debug, Default)]
pub struct PriorityTaskQueue {
    state: Mutex<QueueState>,
}

impl PriorityTaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `task` queued and insert it.
    ///
    /// Re-enqueueing an id that is already queued replaces the earlier entry.
    pub fn enqueue(&self, mut task: Task) {
        task.status = TaskStatus::Queued;
        let id = task.id;

        let mut state = self.lock();
        if let Some((old_key, _)) = state.tasks.remove(&id) {
            state.order.remove(&old_key);
        }
        let key = QueueKey {
            priority: Reverse(task.priority),
            created_at: task.created_at,
            seq: state.next_seq,
        };
        state.next_seq = state.next_seq.wrapping_add(1);
        state.order.insert(key, id);
        state.tasks.insert(id, (key, task));
        debug!(task_id = %id, depth = state.tasks.len(), "task enqueued");
    }

    /// Remove and return the most urgent task, `None` when empty.
    pub fn dequeue(&self) -> Option<Task> {
        let mut state = self.lock();
        let (_, id) = state.order.pop_first()?;
        state.tasks.remove(&id).map(|(_, task)| task)
    }

    /// Copy of a queued task, without removing it.
    pub fn get(&self, id: &Uuid) -> Option<Task> {
        self.lock().tasks.get(id).map(|(_, task)| task.clone())
    }

    /// Withdraw a queued task; `None` if it is not in the queue.
    pub fn remove(&self, id: &Uuid) -> Option<Task> {
        let mut state = self.lock();
        let (key, task) = state.tasks.remove(id)?;
        state.order.remove(&key);
        debug!(task_id = %id, "task removed from queue");
        Some(task)
    }

    /// Current depth.
    pub fn size(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Whether the queue holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Queued tasks in the order they would be dequeued.
    pub fn snapshot(&self) -> Vec<Task> {
        let state = self.lock();
        state
            .order
            .values()
            .filter_map(|id| state.tasks.get(id).map(|(_, task)| task.clone()))
            .collect()
    }
}
