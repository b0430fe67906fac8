//! Admin view: every job with its tasks and a derived state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pricing::Money;
use crate::store::{StoreError, TaskStore};
use crate::task::{Task, TaskSource, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Error,
    Completed,
    Printing,
    Pending,
    Ready,
}

impl JobState {
    /// First match wins: any error (a failed print included), all printed, any printing, any
    /// processing, all ready. Anything else is still pending.
    pub fn derive(statuses: &[TaskStatus]) -> Self {
        if statuses.iter().any(|s| counts_as_error(*s)) {
            JobState::Error
        } else if statuses.iter().all(|s| s.is_printed()) {
            JobState::Completed
        } else if statuses.contains(&TaskStatus::Printing) {
            JobState::Printing
        } else if statuses.iter().any(|s| s.is_processing()) {
            JobState::Pending
        } else if statuses.iter().all(|s| s.is_ready()) {
            JobState::Ready
        } else {
            JobState::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Error => "error",
            JobState::Completed => "completed",
            JobState::Printing => "printing",
            JobState::Pending => "pending",
            JobState::Ready => "ready",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobOverview {
    pub job_id: String,
    pub source: TaskSource,
    pub client_name: Option<String>,
    pub email_subject: Option<String>,
    /// Newest task creation time in the job.
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
    /// Sum of prices over tasks that are neither in error nor failed to print.
    pub total_price: Money,
    pub state: JobState,
}

impl JobOverview {
    fn start(task: &Task) -> Self {
        Self {
            job_id: task.job_id.clone(),
            source: task.source,
            client_name: task.client_name.clone(),
            email_subject: task.email_subject.clone(),
            created_at: task.created_at,
            tasks: Vec::new(),
            total_price: Money::ZERO,
            state: JobState::Pending,
        }
    }

    fn finish(mut self) -> Self {
        self.total_price = self
            .tasks
            .iter()
            .filter(|t| !counts_as_error(t.status))
            .map(|t| t.price)
            .sum();
        let statuses: Vec<TaskStatus> = self.tasks.iter().map(|t| t.status).collect();
        self.state = JobState::derive(&statuses);
        self
    }
}

fn counts_as_error(status: TaskStatus) -> bool {
    status.is_error() || status == TaskStatus::PrintFailed
}

/// Groups every task by job, newest job first.
pub fn list_jobs(store: &TaskStore) -> Result<Vec<JobOverview>, StoreError> {
    let mut jobs: Vec<JobOverview> = Vec::new();
    let mut index_of: HashMap<String, usize> = HashMap::new();
    for task in store.list_all()? {
        let index = *index_of.entry(task.job_id.clone()).or_insert_with(|| {
            jobs.push(JobOverview::start(&task));
            jobs.len() - 1
        });
        jobs[index].tasks.push(task);
    }
    Ok(jobs.into_iter().map(JobOverview::finish).collect())
}
