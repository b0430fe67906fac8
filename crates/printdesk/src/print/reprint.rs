//! One-off print runs of already converted documents.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pricing::{JobSummary, PricingEngine, PrintDescriptor, PrintOptions};
use crate::store::{StoreError, TaskStore};
use crate::task::{Task, TaskStatus};

#[derive(Error, Debug)]
pub enum ReprintError {
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error("Job '{0}' not found")]
    JobNotFound(String),

    #[error("Task '{task_id}' is {status} and cannot be reprinted")]
    NotPrintable { task_id: String, status: TaskStatus },

    #[error("Converted PDF for task '{task_id}' is missing")]
    MissingPdf { task_id: String },

    #[error("Nothing in job '{0}' can be reprinted")]
    NothingToReprint(String),

    #[error("Copies must be at least 1")]
    InvalidCopies,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReprintOptions {
    pub copies: u32,
    pub color: bool,
    pub duplex: bool,
}

impl Default for ReprintOptions {
    fn default() -> Self {
        Self {
            copies: 1,
            color: false,
            duplex: false,
        }
    }
}

impl ReprintOptions {
    /// Whole document on the task's recorded paper size.
    fn for_task(&self, task: &Task) -> PrintOptions {
        PrintOptions {
            color: self.color,
            duplex: self.duplex,
            copies: self.copies,
            paper_size: task.paper_size.unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// Builds a one-task summary for `task_id`.
pub fn reprint_task_summary(
    store: &TaskStore,
    pricing: &PricingEngine,
    task_id: &str,
    options: &ReprintOptions,
) -> Result<JobSummary, ReprintError> {
    if options.copies == 0 {
        return Err(ReprintError::InvalidCopies);
    }
    let task = store
        .get(task_id)?
        .ok_or_else(|| ReprintError::TaskNotFound(task_id.to_string()))?;
    if !can_reprint(task.status) {
        return Err(ReprintError::NotPrintable {
            task_id: task.task_id.clone(),
            status: task.status,
        });
    }
    let pdf = existing_pdf(&task).ok_or_else(|| ReprintError::MissingPdf {
        task_id: task.task_id.clone(),
    })?;

    let descriptor = pricing.describe(&task, pdf, &options.for_task(&task));
    Ok(JobSummary::new(task.job_id.clone(), vec![descriptor]))
}

/// Builds a summary of every reprintable task in `job_id`. Failed,
/// in-flight and PDF-less tasks are skipped.
pub fn reprint_job_summary(
    store: &TaskStore,
    pricing: &PricingEngine,
    job_id: &str,
    options: &ReprintOptions,
) -> Result<JobSummary, ReprintError> {
    if options.copies == 0 {
        return Err(ReprintError::InvalidCopies);
    }
    let tasks = store.list_by_job(job_id)?;
    if tasks.is_empty() {
        return Err(ReprintError::JobNotFound(job_id.to_string()));
    }

    let descriptors: Vec<PrintDescriptor> = tasks
        .iter()
        .filter(|t| can_reprint(t.status))
        .filter_map(|t| existing_pdf(t).map(|pdf| pricing.describe(t, pdf, &options.for_task(t))))
        .collect();

    if descriptors.is_empty() {
        return Err(ReprintError::NothingToReprint(job_id.to_string()));
    }
    Ok(JobSummary::new(job_id, descriptors))
}

fn can_reprint(status: TaskStatus) -> bool {
    status.can_transition_to(TaskStatus::Printing) && status != TaskStatus::Printing
}

fn existing_pdf(task: &Task) -> Option<PathBuf> {
    task.source_path.clone().filter(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PricingConfig;
    use crate::pricing::{Money, PageSelection};
    use crate::task::{PageMode, PaperSize, TaskSource};

    fn engine() -> PricingEngine {
        PricingEngine::from_config(&PricingConfig::default())
    }

    fn insert(
        store: &TaskStore,
        dir: &std::path::Path,
        id: &str,
        status: TaskStatus,
        with_pdf: bool,
    ) -> Task {
        let pdf = dir.join(format!("{}.pdf", id));
        if with_pdf {
            std::fs::write(&pdf, b"%PDF-1.4").unwrap();
        }
        let mut task = Task::new(id, "job-1", TaskSource::Upload, "doc.pdf", id, &pdf)
            .with_status(status);
        task.pages = 4;
        task.source_path = Some(pdf);
        task.paper_size = Some(PaperSize::A3);
        task.page_mode = PageMode::Range;
        task.range_start = Some(2);
        task.range_end = Some(3);
        store.insert(&task).unwrap();
        task
    }

    #[test]
    fn test_reprint_task_uses_whole_document_and_paper_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open_in_memory().unwrap();
        insert(&store, dir.path(), "t1", TaskStatus::PrintSuccess, true);

        let options = ReprintOptions {
            copies: 2,
            color: true,
            duplex: true,
        };
        let summary = reprint_task_summary(&store, &engine(), "t1", &options).unwrap();

        assert_eq!(summary.tasks.len(), 1);
        let d = &summary.tasks[0];
        assert_eq!(d.selection, PageSelection::All);
        assert_eq!(d.paper_size, PaperSize::A3);
        assert!(d.is_duplex);
        assert_eq!(d.price, Money::from_cents(4 * 2 * 70));
    }

    #[test]
    fn test_reprint_task_requires_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open_in_memory().unwrap();
        insert(&store, dir.path(), "t1", TaskStatus::Ready, false);

        let err = reprint_task_summary(&store, &engine(), "t1", &ReprintOptions::default())
            .unwrap_err();
        assert!(matches!(err, ReprintError::MissingPdf { .. }));
    }

    #[test]
    fn test_reprint_task_rejects_failed_and_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open_in_memory().unwrap();
        insert(&store, dir.path(), "bad", TaskStatus::ErrorFatalRead, true);

        let err = reprint_task_summary(&store, &engine(), "bad", &ReprintOptions::default())
            .unwrap_err();
        assert!(matches!(err, ReprintError::NotPrintable { .. }));

        let err = reprint_task_summary(&store, &engine(), "nope", &ReprintOptions::default())
            .unwrap_err();
        assert!(matches!(err, ReprintError::TaskNotFound(_)));
    }

    #[test]
    fn test_reprint_job_skips_unprintable() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open_in_memory().unwrap();
        insert(&store, dir.path(), "ok", TaskStatus::PrintFailed, true);
        insert(&store, dir.path(), "err", TaskStatus::ErrorConversion, true);
        insert(&store, dir.path(), "busy", TaskStatus::Printing, true);
        insert(&store, dir.path(), "nopdf", TaskStatus::Ready, false);

        let summary =
            reprint_job_summary(&store, &engine(), "job-1", &ReprintOptions::default()).unwrap();
        let ids: Vec<_> = summary.tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, ["ok"]);
    }

    #[test]
    fn test_reprint_job_nothing_left() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::open_in_memory().unwrap();
        insert(&store, dir.path(), "err", TaskStatus::ErrorEmptyFile, true);

        let err = reprint_job_summary(&store, &engine(), "job-1", &ReprintOptions::default())
            .unwrap_err();
        assert!(matches!(err, ReprintError::NothingToReprint(_)));

        let err = reprint_job_summary(&store, &engine(), "job-9", &ReprintOptions::default())
            .unwrap_err();
        assert!(matches!(err, ReprintError::JobNotFound(_)));
    }

    #[test]
    fn test_zero_copies() {
        let store = TaskStore::open_in_memory().unwrap();
        let options = ReprintOptions {
            copies: 0,
            ..Default::default()
        };
        assert!(matches!(
            reprint_job_summary(&store, &engine(), "job-1", &options),
            Err(ReprintError::InvalidCopies)
        ));
    }
}
