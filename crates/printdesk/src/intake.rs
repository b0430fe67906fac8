//! Accepting documents: stored names, task rows, and pipeline hand-off.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::IntakeError;
use crate::pipeline::{Pipeline, PipelineRequest};
use crate::sanitize;
use crate::store::TaskStore;
use crate::task::{new_task_id, Task, TaskSource, TaskStatus};

/// A task that was recorded. `handle` is set when the pipeline was started.
#[derive(Debug)]
pub struct AcceptedTask {
    pub task_id: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub status: TaskStatus,
    pub handle: Option<JoinHandle<Option<TaskStatus>>>,
}

impl AcceptedTask {
    /// Waits for the pipeline, if any, and returns the task's last known
    /// status.
    pub async fn finish(self) -> TaskStatus {
        match self.handle {
            Some(handle) => match handle.await {
                Ok(Some(status)) => status,
                Ok(None) => self.status,
                Err(e) => {
                    log::error!("Pipeline for task {} panicked: {}", self.task_id, e);
                    self.status
                }
            },
            None => self.status,
        }
    }
}

/// Records submitted documents and starts their pipelines. Must be used
/// inside a tokio runtime.
#[derive(Clone)]
pub struct Intake {
    config: Arc<Config>,
    store: TaskStore,
    pipeline: Arc<Pipeline>,
}

impl Intake {
    pub fn new(config: Arc<Config>, store: TaskStore, pipeline: Arc<Pipeline>) -> Self {
        Self {
            config,
            store,
            pipeline,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rejects file names whose extension is not on the allow list.
    pub fn check_extension(&self, original_filename: &str) -> Result<(), IntakeError> {
        let ext = sanitize::extension_of(original_filename).unwrap_or_default();
        if !self.config.is_allowed_extension(&ext) {
            return Err(IntakeError::DisallowedExtension(original_filename.to_string()));
        }
        Ok(())
    }

    /// Accepts one uploaded document into `job_id`.
    pub fn upload(
        &self,
        job_id: &str,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<AcceptedTask, IntakeError> {
        self.check_extension(original_filename)?;

        let stored = upload_stored_name(original_filename, Utc::now().timestamp());
        let path = self.config.upload_dir().join(&stored);
        let task = Task::new(
            new_task_id(),
            job_id,
            TaskSource::Upload,
            original_filename,
            stored,
            &path,
        );
        self.accept(task, bytes)
    }

    /// Reads `path` from disk and uploads it under its own file name.
    pub fn upload_file(&self, job_id: &str, path: &Path) -> Result<AcceptedTask, IntakeError> {
        let bytes = std::fs::read(path).map_err(|e| IntakeError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document");
        self.upload(job_id, name, &bytes)
    }

    /// Writes `bytes` to `task.input_path` and records the task.
    ///
    /// Empty content is recorded as `ErrorEmptyFile` and nothing is kept on
    /// disk; otherwise the task is queued and its pipeline started.
    pub(crate) fn accept(&self, task: Task, bytes: &[u8]) -> Result<AcceptedTask, IntakeError> {
        if bytes.is_empty() {
            let task = task.with_status(TaskStatus::ErrorEmptyFile);
            remove_if_present(&task.input_path);
            self.store.insert(&task)?;
            log::warn!(
                "Task {} ({}) is empty, not processed",
                task.task_id,
                task.original_filename
            );
            return Ok(AcceptedTask {
                task_id: task.task_id,
                original_filename: task.original_filename,
                stored_filename: task.stored_filename,
                status: TaskStatus::ErrorEmptyFile,
                handle: None,
            });
        }

        write_new_file(&task.input_path, bytes)?;
        if let Err(e) = self.store.insert(&task) {
            remove_if_present(&task.input_path);
            return Err(e.into());
        }
        log::info!(
            "Task {} created for '{}' in job {}",
            task.task_id,
            task.original_filename,
            task.job_id
        );

        let handle = self.pipeline.spawn(PipelineRequest::for_task(&task));
        Ok(AcceptedTask {
            task_id: task.task_id,
            original_filename: task.original_filename,
            stored_filename: task.stored_filename,
            status: TaskStatus::Queued,
            handle: Some(handle),
        })
    }
}

/// `<unix_ts>_<8 hex>_<sanitized name>`
pub fn upload_stored_name(original_filename: &str, unix_ts: i64) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        unix_ts,
        &uuid[..8],
        safe_name(original_filename)
    )
}

/// Sanitized name that keeps the original extension.
pub(crate) fn safe_name(original_filename: &str) -> String {
    let (stem, ext) = safe_parts(original_filename);
    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Sanitized stem (never empty) and lower-cased extension.
pub(crate) fn safe_parts(original_filename: &str) -> (String, Option<String>) {
    let path = Path::new(original_filename);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize::secure_filename)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    let ext = sanitize::extension_of(original_filename)
        .map(|e| sanitize::secure_filename(&e))
        .filter(|e| !e.is_empty());
    (stem, ext)
}

fn write_new_file(path: &Path, bytes: &[u8]) -> Result<(), IntakeError> {
    let to_err = |e: std::io::Error| IntakeError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(to_err)?;
    }
    std::fs::write(path, bytes).map_err(to_err)
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Cannot remove {}: {}", sanitize::redact_path(path), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{OfficeConverter, ThreadPageCounter};
    use std::time::Duration;

    fn intake(dir: &Path) -> (Intake, TaskStore) {
        let config = Arc::new(Config::with_data_dir(dir));
        let store = TaskStore::open_in_memory().unwrap();
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            Arc::new(OfficeConverter::new(None, config.converted_dir())),
            Arc::new(ThreadPageCounter::new(Duration::from_secs(10))),
            2,
        ));
        (Intake::new(config, store.clone(), pipeline), store)
    }

    #[test]
    fn test_upload_stored_name() {
        let name = upload_stored_name("My Report.docx", 1700000000);
        let parts: Vec<&str> = name.splitn(3, '_').collect();
        assert_eq!(parts[0], "1700000000");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2], "My_Report.docx");
    }

    #[test]
    fn test_safe_name_falls_back() {
        assert_eq!(safe_name("имя.pdf"), "document.pdf");
        assert_eq!(safe_name("???"), "document");
        assert_eq!(safe_name("Notes.TXT"), "Notes.txt");
        assert_eq!(safe_name("archive.tar.gz"), "archive.tar.gz");
    }

    #[tokio::test]
    async fn test_disallowed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, store) = intake(dir.path());
        let err = intake.upload("job-1", "virus.exe", b"MZ").unwrap_err();
        assert!(matches!(err, IntakeError::DisallowedExtension(_)));
        assert!(store.list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_upload_recorded_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, store) = intake(dir.path());

        let accepted = intake.upload("job-1", "blank.pdf", b"").unwrap();
        assert_eq!(accepted.status, TaskStatus::ErrorEmptyFile);
        assert!(accepted.handle.is_none());

        let task = store.get(&accepted.task_id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::ErrorEmptyFile);
        assert!(!task.input_path.exists());
    }

    #[tokio::test]
    async fn test_pdf_upload_runs_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let (intake, store) = intake(dir.path());
        let pdf_dir = tempfile::tempdir().unwrap();
        let pdf = crate::pipeline::count::tests::write_test_pdf(pdf_dir.path(), "in.pdf", 2);
        let bytes = std::fs::read(&pdf).unwrap();

        let accepted = intake.upload("job-1", "scan.pdf", &bytes).unwrap();
        let task_id = accepted.task_id.clone();
        assert_eq!(accepted.status, TaskStatus::Queued);
        assert_eq!(accepted.finish().await, TaskStatus::Ready);

        let task = store.get(&task_id).unwrap().unwrap();
        assert_eq!(task.pages, 2);
        assert!(task.input_path.starts_with(dir.path().join("uploads")));
        assert_eq!(task.source, TaskSource::Upload);
    }
}
