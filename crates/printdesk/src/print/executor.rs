//! Sequential print runs against the portal.
//!
//! One session per job. The first failing step fails the task in progress
//! and every task after it; tasks already submitted keep their outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::pricing::{JobSummary, PrintDescriptor};
use crate::store::{StoreError, TaskStore};
use crate::task::TaskStatus;

use super::chrome::ChromePortal;
use super::portal::{PortalError, PortalLauncher, PortalSession};
use super::step::PrintStep;

#[derive(Error, Debug)]
enum RunError {
    #[error(transparent)]
    Portal(#[from] PortalError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where a run stopped.
struct Abort {
    index: usize,
    step: &'static str,
    error: RunError,
}

/// What happened to each task of a print run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrintReport {
    pub job_id: String,
    pub printed: Vec<String>,
    pub failed: Vec<String>,
    pub error: Option<String>,
    pub diagnostic: Option<PathBuf>,
}

impl PrintReport {
    fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.error.is_none()
    }
}

pub struct PrintExecutor {
    store: TaskStore,
    launcher: Arc<dyn PortalLauncher>,
    step_timeout: Duration,
    diagnostics_dir: PathBuf,
}

impl PrintExecutor {
    pub fn new(
        store: TaskStore,
        launcher: Arc<dyn PortalLauncher>,
        step_timeout: Duration,
        diagnostics_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            launcher,
            step_timeout,
            diagnostics_dir: diagnostics_dir.into(),
        }
    }

    pub fn from_config(config: &Config, store: TaskStore) -> Self {
        Self::new(
            store,
            Arc::new(ChromePortal::new(config.portal.clone())),
            config.portal.step_timeout(),
            config.diagnostics_dir(),
        )
    }

    /// Prints `summary` on a separate tokio task.
    ///
    /// If the run itself panics, tasks not yet printed are marked
    /// `PrintFailed`.
    pub fn spawn(self: &Arc<Self>, summary: JobSummary) -> JoinHandle<PrintReport> {
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            let job_id = summary.job_id.clone();
            let task_ids: Vec<String> = summary.tasks.iter().map(|t| t.task_id.clone()).collect();

            let run = {
                let executor = Arc::clone(&executor);
                tokio::spawn(async move { executor.execute(summary).await })
            };
            match run.await {
                Ok(report) => report,
                Err(join_err) => {
                    error!(job_id = %job_id, error = %join_err, "Print run aborted");
                    let mut report = PrintReport::new(&job_id);
                    report.failed = executor.fail_unfinished(&task_ids);
                    report.error = Some(join_err.to_string());
                    report
                }
            }
        })
    }

    /// Prints every task of `summary` in order through one portal session.
    pub async fn execute(&self, summary: JobSummary) -> PrintReport {
        let span = info_span!("print_job", job_id = %summary.job_id, tasks = summary.tasks.len());
        self.execute_inner(summary).instrument(span).await
    }

    async fn execute_inner(&self, summary: JobSummary) -> PrintReport {
        let mut report = PrintReport::new(&summary.job_id);
        if summary.is_empty() {
            return report;
        }

        let mut session = match self.launcher.launch().await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "Cannot open print portal");
                report.failed = self.fail_from(&summary.tasks, 0);
                report.error = Some(e.to_string());
                return report;
            }
        };

        if let Err(abort) = self
            .print_all(session.as_mut(), &summary.tasks, &mut report)
            .await
        {
            let task_id = &summary.tasks[abort.index].task_id;
            error!(
                task_id = %task_id,
                step = abort.step,
                error = %abort.error,
                "Print run failed, failing remaining tasks"
            );
            report.diagnostic = self.capture(session.as_mut()).await;
            report.failed = self.fail_from(&summary.tasks, abort.index);
            report.error = Some(format!("{} at {}: {}", task_id, abort.step, abort.error));
        }

        if let Err(e) = session.close().await {
            warn!(error = %e, "Browser did not shut down cleanly");
        }
        info!(
            printed = report.printed.len(),
            failed = report.failed.len(),
            "Print run finished"
        );
        report
    }

    async fn print_all(
        &self,
        session: &mut dyn PortalSession,
        tasks: &[PrintDescriptor],
        report: &mut PrintReport,
    ) -> Result<(), Abort> {
        for (index, task) in tasks.iter().enumerate() {
            let abort = |step: &'static str| move |error: RunError| Abort { index, step, error };

            self.store
                .set_status(&task.task_id, TaskStatus::Printing)
                .map_err(|e| abort("mark_printing")(e.into()))?;

            async {
                for step in PrintStep::sequence_for(task) {
                    self.perform(session, &step)
                        .await
                        .map_err(|e| abort(step.name())(e.into()))?;
                }
                Ok::<(), Abort>(())
            }
            .instrument(info_span!("print_task", task_id = %task.task_id, filename = %task.filename))
            .await?;

            let outcome = if task.has_page_count() {
                TaskStatus::PrintSuccess
            } else {
                TaskStatus::PrintSuccessNoCount
            };
            self.store
                .set_status(&task.task_id, outcome)
                .map_err(|e| abort("mark_printed")(e.into()))?;
            report.printed.push(task.task_id.clone());
            info!(task_id = %task.task_id, "Task sent to printer");

            if index + 1 < tasks.len() {
                let step = PrintStep::ReturnToForm;
                self.perform(session, &step)
                    .await
                    .map_err(|e| Abort {
                        index: index + 1,
                        step: step.name(),
                        error: e.into(),
                    })?;
            }
        }
        Ok(())
    }

    async fn perform(
        &self,
        session: &mut dyn PortalSession,
        step: &PrintStep,
    ) -> Result<(), PortalError> {
        match tokio::time::timeout(self.step_timeout, session.perform(step)).await {
            Ok(result) => result,
            Err(_) => Err(PortalError::Timeout {
                step: step.name(),
                after: self.step_timeout,
            }),
        }
    }

    async fn capture(&self, session: &mut dyn PortalSession) -> Option<PathBuf> {
        if let Err(e) = tokio::fs::create_dir_all(&self.diagnostics_dir).await {
            warn!(error = %e, "Cannot create diagnostics directory");
            return None;
        }
        let path = self
            .diagnostics_dir
            .join(format!("print_error_{}.png", Utc::now().timestamp()));
        match tokio::time::timeout(self.step_timeout, session.capture_diagnostic(&path)).await {
            Ok(Ok(())) => {
                info!(file = %path.display(), "Saved diagnostic screenshot");
                Some(path)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Cannot capture diagnostic");
                None
            }
            Err(_) => {
                warn!("Diagnostic capture timed out");
                None
            }
        }
    }

    /// Marks `tasks[from..]` as `PrintFailed` and returns their ids.
    fn fail_from(&self, tasks: &[PrintDescriptor], from: usize) -> Vec<String> {
        let mut failed = Vec::new();
        for task in tasks.iter().skip(from) {
            match self.store.set_status(&task.task_id, TaskStatus::PrintFailed) {
                Ok(()) => {}
                Err(e) => warn!(task_id = %task.task_id, error = %e, "Cannot mark task failed"),
            }
            failed.push(task.task_id.clone());
        }
        failed
    }

    /// Fails the listed tasks that have not reached a print outcome.
    fn fail_unfinished(&self, task_ids: &[String]) -> Vec<String> {
        let mut failed = Vec::new();
        for task_id in task_ids {
            let status = match self.store.get(task_id) {
                Ok(Some(task)) => task.status,
                Ok(None) => continue,
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Cannot read task");
                    continue;
                }
            };
            if status.is_printed() {
                continue;
            }
            if let Err(e) = self.store.set_status(task_id, TaskStatus::PrintFailed) {
                warn!(task_id = %task_id, error = %e, "Cannot mark task failed");
            }
            failed.push(task_id.clone());
        }
        failed
    }
}
