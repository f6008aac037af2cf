//! Tests for `src/kernel/monitor.rs`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use taskhive::config::TaskhiveConfig;
use taskhive::kernel::audit::AuditEventType;
use taskhive::kernel::events::WILDCARD_TOPIC;
use taskhive::kernel::Kernel;
use taskhive::store::MemoryStore;
use taskhive::types::{TaskRequest, TaskStatus, Worker, WorkerCapability, WorkerStatus};

async fn kernel_with(config: TaskhiveConfig) -> Kernel {
    Kernel::new(config, Arc::new(MemoryStore::new()))
        .await
        .expect("kernel")
}

fn worker(id: &str) -> Worker {
    Worker::new(id, "ops", vec![WorkerCapability::new("analysis", "research")])
}

#[tokio::test]
async fn sweep_times_out_overdue_task_and_frees_worker() {
    let kernel = kernel_with(TaskhiveConfig::default()).await;
    let (_sub, mut rx) = kernel.events().subscribe_channel("task_timed_out");
    kernel.register_worker(worker("w1"));
    let task = kernel
        .submit_task(TaskRequest::new("crunch numbers", "alice").with_timeout(2))
        .await
        .expect("submit");
    let assignment = kernel.dispatch_next().await.expect("assigned");
    assert_eq!(assignment.task.id, task.id);

    // Not yet overdue.
    assert!(kernel.sweep(Utc::now()).await.is_empty());

    let report = kernel.sweep(Utc::now() + chrono::Duration::seconds(5)).await;
    assert_eq!(report.timed_out, vec![task.id]);

    let timed_out = kernel.get_task(&task.id).expect("task");
    assert_eq!(timed_out.status, TaskStatus::TimedOut);
    assert!(timed_out.completed_at.is_some());
    assert!(timed_out.error.is_some());

    let w = kernel.get_worker("w1").expect("worker");
    assert_eq!(w.status, WorkerStatus::Idle);
    assert!(w.current_task.is_none());
    assert_eq!(kernel.worker_metrics("w1").map(|m| m.failed), Some(1));

    let event = rx.recv().await.expect("event");
    assert_eq!(event.payload["task_id"], serde_json::json!(task.id));

    let audited = kernel
        .list_audit_events(Some(AuditEventType::TaskTimedOut.as_str()), 10)
        .await
        .expect("audit");
    assert_eq!(audited.len(), 1);

    // A second sweep finds nothing left to do.
    assert!(kernel
        .sweep(Utc::now() + chrono::Duration::seconds(10))
        .await
        .is_empty());
}

#[tokio::test]
async fn sweep_ignores_completed_tasks() {
    let kernel = kernel_with(TaskhiveConfig::default()).await;
    kernel.register_worker(worker("w1"));
    let task = kernel
        .submit_task(TaskRequest::new("quick job", "alice").with_timeout(1))
        .await
        .expect("submit");
    kernel.dispatch_next().await.expect("assigned");
    assert!(kernel
        .complete_task(&task.id, serde_json::json!({"ok": true}))
        .is_applied());

    let report = kernel.sweep(Utc::now() + chrono::Duration::seconds(60)).await;
    assert!(report.timed_out.is_empty());
    assert_eq!(
        kernel.get_task(&task.id).map(|t| t.status),
        Some(TaskStatus::Completed)
    );
}

#[tokio::test]
async fn silent_workers_are_demoted_when_liveness_is_enabled() {
    let mut config = TaskhiveConfig::default();
    config.kernel.worker_liveness_secs = Some(30);
    let kernel = kernel_with(config).await;
    let (_sub, mut rx) = kernel.events().subscribe_channel("worker_offline");
    kernel.register_worker(worker("w1"));

    let report = kernel.sweep(Utc::now() + chrono::Duration::seconds(60)).await;
    assert_eq!(report.offline, vec!["w1".to_owned()]);
    assert_eq!(
        kernel.get_worker("w1").map(|w| w.status),
        Some(WorkerStatus::Offline)
    );
    assert_eq!(
        rx.recv().await.map(|e| e.payload["worker_id"].clone()),
        Some(serde_json::json!("w1"))
    );

    // Offline workers are not offered tasks; a heartbeat brings them back.
    kernel
        .submit_task(TaskRequest::new("pending", "alice"))
        .await
        .expect("submit");
    assert!(kernel.dispatch_next().await.is_none());
    assert!(kernel.heartbeat("w1"));
    assert!(kernel.dispatch_next().await.is_some());
}

#[tokio::test]
async fn demoted_busy_worker_is_not_handed_a_second_task() {
    let mut config = TaskhiveConfig::default();
    config.kernel.worker_liveness_secs = Some(30);
    let kernel = kernel_with(config).await;
    kernel.register_worker(worker("w1"));
    let first = kernel
        .submit_task(TaskRequest::new("long analysis", "alice").with_timeout(600))
        .await
        .expect("submit");
    kernel.dispatch_next().await.expect("assigned");

    let report = kernel.sweep(Utc::now() + chrono::Duration::seconds(60)).await;
    assert_eq!(report.offline, vec!["w1".to_owned()]);
    assert!(report.timed_out.is_empty());
    assert_eq!(
        kernel.get_worker("w1").and_then(|w| w.current_task),
        Some(first.id)
    );

    // Back online, still holding the first task.
    assert!(kernel.heartbeat("w1"));
    assert_eq!(
        kernel.get_worker("w1").map(|w| w.status),
        Some(WorkerStatus::Busy)
    );
    let second = kernel
        .submit_task(TaskRequest::new("follow-up", "alice"))
        .await
        .expect("submit");
    assert!(kernel.dispatch_next().await.is_none());
    assert_eq!(
        kernel.get_task(&second.id).map(|t| t.status),
        Some(TaskStatus::Queued)
    );

    assert!(kernel.complete_task(&first.id, serde_json::json!("done")).is_applied());
    let assignment = kernel.dispatch_next().await.expect("assigned");
    assert_eq!(assignment.task.id, second.id);
    assert_eq!(assignment.worker_id, "w1");
}

#[tokio::test]
async fn liveness_is_off_by_default() {
    let kernel = kernel_with(TaskhiveConfig::default()).await;
    kernel.register_worker(worker("w1"));
    let report = kernel.sweep(Utc::now() + chrono::Duration::days(1)).await;
    assert!(report.offline.is_empty());
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let kernel = kernel_with(TaskhiveConfig::default()).await;
    let (_sub, mut rx) = kernel.events().subscribe_channel(WILDCARD_TOPIC);

    assert!(kernel.start());
    assert!(!kernel.start());
    assert!(kernel.is_running());

    assert!(kernel.stop().await);
    assert!(!kernel.stop().await);
    assert!(!kernel.is_running());

    assert_eq!(rx.recv().await.map(|e| e.topic), Some("kernel_started".into()));
    assert_eq!(rx.recv().await.map(|e| e.topic), Some("kernel_stopped".into()));
    assert!(rx.try_recv().is_err());

    // Restartable after a stop.
    assert!(kernel.start());
    assert!(kernel.stop().await);
}

#[tokio::test]
async fn running_monitor_enforces_timeouts() {
    let mut config = TaskhiveConfig::default();
    config.kernel.monitor_interval_ms = 20;
    let kernel = kernel_with(config).await;
    kernel.register_worker(worker("w1"));
    let task = kernel
        .submit_task(TaskRequest::new("hangs forever", "alice").with_timeout(1))
        .await
        .expect("submit");
    kernel.dispatch_next().await.expect("assigned");

    assert!(kernel.start());
    let mut status = TaskStatus::Running;
    for _ in 0..100 {
        status = kernel.get_task(&task.id).map_or(status, |t| t.status);
        if status == TaskStatus::TimedOut {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(kernel.stop().await);
    assert_eq!(status, TaskStatus::TimedOut);
}

#[tokio::test]
async fn no_timeouts_fire_after_stop() {
    let mut config = TaskhiveConfig::default();
    config.kernel.monitor_interval_ms = 20;
    let kernel = kernel_with(config).await;
    kernel.register_worker(worker("w1"));
    let task = kernel
        .submit_task(TaskRequest::new("long job", "alice").with_timeout(1))
        .await
        .expect("submit");
    kernel.dispatch_next().await.expect("assigned");

    assert!(kernel.start());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(kernel.stop().await);

    // Well past the timeout, but the monitor is gone.
    tokio::time::sleep(Duration::from_millis(1_300)).await;
    assert_eq!(
        kernel.get_task(&task.id).map(|t| t.status),
        Some(TaskStatus::Running)
    );
}
