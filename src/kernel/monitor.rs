//! Scheduling monitor: background enforcement of task timeouts.
//!
//! Runs as a Tokio task ticking at `kernel.monitor_interval_ms`. Each tick
//! moves every overdue `Running` task to `TimedOut`, frees its worker and
//! records the failure. When `kernel.worker_liveness_secs` is set, workers
//! that stopped sending heartbeats are demoted to `Offline` on the same tick.
//!
//! [`sweep`] is the whole of one tick and takes the clock as a parameter, so
//! tests can drive it without a running loop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::kernel::audit::{AuditEventType, AuditLog};
use crate::kernel::events::EventBus;
use crate::kernel::registry::WorkerRegistry;
use crate::kernel::tasks::{TaskTable, TransitionOutcome};
use crate::types::{JsonMap, TaskStatus, WorkerStatus};

/// Actor recorded on audit entries written by the monitor.
pub const MONITOR_ACTOR: &str = "monitor";

/// Event source used for monitor publications.
const MONITOR_SOURCE: &str = "kernel.monitor";

/// Shared state the monitor inspects and mutates.
#[derive(Debug, Clone)]
pub struct MonitorDeps {
    /// Authoritative task records.
    pub tasks: Arc<TaskTable>,
    /// Worker records.
    pub registry: Arc<WorkerRegistry>,
    /// Audit trail for timeouts and demotions.
    pub audit: Arc<AuditLog>,
    /// Event fan-out.
    pub events: Arc<EventBus>,
    /// Heartbeat window after which a worker is demoted; `None` disables it.
    pub worker_liveness: Option<Duration>,
}

/// What a single sweep changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tasks moved to `TimedOut`.
    pub timed_out: Vec<Uuid>,
    /// Workers demoted to `Offline`.
    pub offline: Vec<String>,
}

impl SweepReport {
    /// Whether the sweep changed nothing.
    pub fn is_empty(&self) -> bool {
        self.timed_out.is_empty() && self.offline.is_empty()
    }
}

/// Run one monitor pass as of `now`.
///
/// Audit write failures are logged; the state transitions they describe have
/// already happened and are not rolled back.
pub async fn sweep(deps: &MonitorDeps, now: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();

    for task in deps.tasks.overdue(now) {
        let outcome = deps
            .tasks
            .transition_at(&task.id, TaskStatus::TimedOut, now, |t| {
                t.error = Some(format!("task exceeded timeout of {}s", t.timeout_seconds));
            });
        let TransitionOutcome::Applied(task) = outcome else {
            // Completed or cancelled between the scan and the transition.
            continue;
        };

        if let Some(worker_id) = task.assigned_worker.as_deref() {
            deps.registry.release(worker_id, task.id);
            deps.registry.record_failure(worker_id);
        }
        warn!(
            task_id = %task.id,
            worker_id = task.assigned_worker.as_deref().unwrap_or(""),
            timeout_secs = task.timeout_seconds,
            "task timed out"
        );

        let mut details = JsonMap::new();
        details.insert("task_id".into(), json!(task.id));
        details.insert("worker_id".into(), json!(task.assigned_worker));
        details.insert("timeout_seconds".into(), json!(task.timeout_seconds));
        if let Err(e) = deps
            .audit
            .append(AuditEventType::TaskTimedOut, MONITOR_ACTOR, details)
            .await
        {
            error!(task_id = %task.id, error = %e, "failed to audit task timeout");
        }

        deps.events.publish(
            "task_timed_out",
            json!({
                "task_id": task.id,
                "worker_id": task.assigned_worker,
                "timeout_seconds": task.timeout_seconds,
            }),
            MONITOR_SOURCE,
        );
        report.timed_out.push(task.id);
    }

    if let Some(window) = deps.worker_liveness {
        for worker_id in deps.registry.stale_workers(window, now) {
            if !deps.registry.update_status(&worker_id, WorkerStatus::Offline) {
                continue;
            }
            warn!(worker_id = %worker_id, "worker missed heartbeats, marked offline");

            let mut details = JsonMap::new();
            details.insert("worker_id".into(), json!(worker_id));
            details.insert("liveness_secs".into(), json!(window.as_secs()));
            if let Err(e) = deps
                .audit
                .append(AuditEventType::WorkerOffline, MONITOR_ACTOR, details)
                .await
            {
                error!(worker_id = %worker_id, error = %e, "failed to audit worker demotion");
            }

            deps.events.publish(
                "worker_offline",
                json!({ "worker_id": worker_id }),
                MONITOR_SOURCE,
            );
            report.offline.push(worker_id);
        }
    }

    report
}

/// Run the monitor loop until the shutdown signal is set or its sender drops.
pub async fn run_monitor(
    deps: Arc<MonitorDeps>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    info!(interval_ms, "scheduling monitor started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Skip the first immediate tick.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sweep(&deps, Utc::now()).await;
                if !report.is_empty() {
                    info!(
                        timed_out = report.timed_out.len(),
                        offline = report.offline.len(),
                        "monitor sweep applied changes"
                    );
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("scheduling monitor shutting down");
                    break;
                }
            }
        }
    }

    info!("scheduling monitor stopped");
}

struct RunningMonitor {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Start/stop handle around [`run_monitor`].
pub struct TimeoutMonitor {
    interval: Duration,
    running: Mutex<Option<RunningMonitor>>,
}

impl std::fmt::Debug for TimeoutMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeoutMonitor")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl TimeoutMonitor {
    /// Monitor that will tick every `interval` once started.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<RunningMonitor>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the loop is running.
    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    /// Spawn the loop. Returns `false` if it was already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, deps: Arc<MonitorDeps>) -> bool {
        let mut running = self.lock();
        if running.is_some() {
            return false;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_monitor(deps, self.interval, shutdown_rx));
        *running = Some(RunningMonitor {
            shutdown_tx,
            handle,
        });
        true
    }

    /// Signal the loop and wait for it to exit. Returns `false` if it was not running.
    ///
    /// No sweep is in progress or will start once this returns.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.lock().take() else {
            return false;
        };
        // A send error means the loop already exited and dropped its receiver.
        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.handle.await {
            warn!(error = %e, "scheduling monitor ended abnormally");
        }
        true
    }
}
