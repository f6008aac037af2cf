//! Tests for `src/kernel/queue.rs`.

use std::collections::HashSet;
use std::sync::Mutex;

use taskhive::kernel::queue::PriorityTaskQueue;
use taskhive::types::{Task, TaskRequest};
use uuid::Uuid;

fn task(priority: i32) -> Task {
    Task::create(TaskRequest::new("queued work", "tester").with_priority(priority))
}

#[test]
fn dequeue_returns_highest_priority_first() {
    let queue = PriorityTaskQueue::new();
    queue.enqueue(task(3));
    queue.enqueue(task(9));
    queue.enqueue(task(5));

    let order: Vec<i32> = std::iter::from_fn(|| queue.dequeue())
        .map(|t| t.priority)
        .collect();
    assert_eq!(order, vec![9, 5, 3]);
}

#[test]
fn equal_priority_is_fifo_by_creation_time() {
    let queue = PriorityTaskQueue::new();
    let older = task(5);
    let mut newer = task(5);
    newer.created_at = older.created_at + chrono::Duration::milliseconds(10);
    let (older_id, newer_id) = (older.id, newer.id);

    // Insert the newer task first; creation time still wins.
    queue.enqueue(newer);
    queue.enqueue(older);

    assert_eq!(queue.dequeue().map(|t| t.id), Some(older_id));
    assert_eq!(queue.dequeue().map(|t| t.id), Some(newer_id));
}

#[test]
fn empty_queue_dequeues_none() {
    let queue = PriorityTaskQueue::new();
    assert!(queue.dequeue().is_none());
    assert!(queue.is_empty());
}

#[test]
fn removed_task_is_never_dequeued() {
    let queue = PriorityTaskQueue::new();
    let t = task(10);
    let id = t.id;
    queue.enqueue(t);
    queue.enqueue(task(1));

    assert!(queue.remove(&id).is_some());
    assert!(queue.remove(&id).is_none());
    assert!(queue.get(&id).is_none());
    assert_eq!(queue.dequeue().map(|t| t.priority), Some(1));
    assert!(queue.dequeue().is_none());
}

#[test]
fn get_does_not_remove() {
    let queue = PriorityTaskQueue::new();
    let t = task(4);
    let id = t.id;
    queue.enqueue(t);

    assert_eq!(queue.get(&id).map(|t| t.id), Some(id));
    assert_eq!(queue.size(), 1);
    assert!(queue.get(&Uuid::new_v4()).is_none());
}

#[test]
fn concurrent_remove_and_dequeue_hand_out_each_task_once() {
    let queue = PriorityTaskQueue::new();
    let ids: Vec<Uuid> = (0..500)
        .map(|i| {
            let t = task(i % 7);
            let id = t.id;
            queue.enqueue(t);
            id
        })
        .collect();

    let dequeued = Mutex::new(Vec::new());
    let removed = Mutex::new(Vec::new());

    std::thread::scope(|s| {
        s.spawn(|| {
            while let Some(t) = queue.dequeue() {
                dequeued.lock().expect("lock").push(t.id);
            }
        });
        s.spawn(|| {
            for id in ids.iter().rev() {
                if let Some(t) = queue.remove(id) {
                    removed.lock().expect("lock").push(t.id);
                }
            }
        });
    });

    let dequeued = dequeued.into_inner().expect("lock");
    let removed = removed.into_inner().expect("lock");
    let dequeued_set: HashSet<Uuid> = dequeued.iter().copied().collect();
    let removed_set: HashSet<Uuid> = removed.iter().copied().collect();

    assert!(dequeued_set.is_disjoint(&removed_set), "a task was both removed and dequeued");
    assert_eq!(dequeued.len().saturating_add(removed.len()), ids.len());
    assert!(queue.is_empty());
}
