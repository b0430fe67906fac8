//! Job status polling with lazy reaping of stuck tasks.
//!
//! A task still in `Queued`, `Converting` or `Counting` longer than the
//! staleness window is forced to `ErrorConversion` when its job is queried.
//! [`StaleSweeper`] applies the same rule on a timer for tasks nobody polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::pricing::Money;
use crate::store::{StoreError, TaskStore};
use crate::task::{Task, TaskStatus};

/// The client-facing view of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatusView {
    pub task_id: String,
    pub filename: String,
    pub status: TaskStatus,
    pub pages: u32,
    pub price: Money,
}

impl From<&Task> for TaskStatusView {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            filename: task.original_filename.clone(),
            status: task.status,
            pages: task.pages,
            price: task.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatusSnapshot {
    pub job_id: String,
    pub tasks: Vec<TaskStatusView>,
    /// Every task is terminal. Vacuously true for a job with no tasks.
    pub is_complete: bool,
}

impl JobStatusSnapshot {
    pub fn from_tasks(job_id: impl Into<String>, tasks: &[Task]) -> Self {
        Self {
            job_id: job_id.into(),
            tasks: tasks.iter().map(TaskStatusView::from).collect(),
            is_complete: tasks.iter().all(|t| t.status.is_terminal()),
        }
    }
}

/// Whether `task` has been processing for longer than `stale_after`.
pub fn is_stale(task: &Task, stale_after: Duration, now: DateTime<Utc>) -> bool {
    if !task.status.is_processing() {
        return false;
    }
    match now.signed_duration_since(task.created_at).to_std() {
        Ok(age) => age > stale_after,
        Err(_) => false,
    }
}

/// Fails every stale task in `tasks`, updating the slice in place.
///
/// A task that moved on between the read and the write keeps the status
/// the store reports. Returns how many tasks were reaped.
pub fn reap_stale(
    store: &TaskStore,
    tasks: &mut [Task],
    stale_after: Duration,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let mut reaped = 0;
    for task in tasks.iter_mut().filter(|t| is_stale(t, stale_after, now)) {
        match store.set_status(&task.task_id, TaskStatus::ErrorConversion) {
            Ok(()) => {
                log::warn!(
                    "Task {} stuck in {} since {}, marked {}",
                    task.task_id,
                    task.status,
                    task.created_at.to_rfc3339(),
                    TaskStatus::ErrorConversion
                );
                task.status = TaskStatus::ErrorConversion;
                reaped += 1;
            }
            Err(StoreError::InvalidTransition { from, .. }) => {
                task.status = from;
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(reaped)
}

/// Reaps the job's stale tasks, then returns its status.
pub fn job_status(
    store: &TaskStore,
    job_id: &str,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> Result<JobStatusSnapshot, StoreError> {
    let mut tasks = store.list_by_job(job_id)?;
    reap_stale(store, &mut tasks, stale_after, now)?;
    Ok(JobStatusSnapshot::from_tasks(job_id, &tasks))
}

/// Reaps stale tasks across all jobs.
pub fn sweep_stale(
    store: &TaskStore,
    stale_after: Duration,
    now: DateTime<Utc>,
) -> Result<usize, StoreError> {
    let mut tasks = store.list_processing()?;
    reap_stale(store, &mut tasks, stale_after, now)
}

/// Periodic background reaper.
pub struct StaleSweeper {
    store: TaskStore,
    stale_after: Duration,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl StaleSweeper {
    pub fn new(store: TaskStore, stale_after: Duration, interval: Duration) -> Self {
        Self {
            store,
            stale_after,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the sweep loop on the current runtime.
    pub fn start(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let stale_after = self.stale_after;
        let interval = self.interval;
        let shutdown = Arc::clone(&self.shutdown);

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await; // first tick fires immediately

            loop {
                timer.tick().await;
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                match sweep_stale(&store, stale_after, Utc::now()) {
                    Ok(0) => {}
                    Ok(n) => log::info!("Sweep reaped {} stale task(s)", n),
                    Err(e) => log::error!("Stale-task sweep failed: {}", e),
                }
            }
        })
    }

    /// The loop exits at its next tick.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
