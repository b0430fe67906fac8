//! One email in, one job out.

use chrono::Utc;
use tracing::{info, info_span, warn};

use crate::intake::{safe_parts, AcceptedTask, Intake};
use crate::sanitize;
use crate::task::{new_task_id, Task, TaskSource};

use super::error::{EmailError, Result};
use super::parser::parse_email;

/// The job created from one message.
#[derive(Debug)]
pub struct IngestedEmail {
    pub job_id: String,
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub tasks: Vec<AcceptedTask>,
    /// Attachments dropped for their file type.
    pub skipped: Vec<String>,
}

#[derive(Clone)]
pub struct EmailIngest {
    intake: Intake,
}

impl EmailIngest {
    pub fn new(intake: Intake) -> Self {
        Self { intake }
    }

    /// Turns every printable document of `raw` into a task of a new job.
    pub fn ingest(&self, raw: &[u8]) -> Result<IngestedEmail> {
        let config = self.intake.config();
        let parsed = parse_email(raw, &config.email.body_filename)?;
        let subject_label = parsed
            .subject
            .clone()
            .unwrap_or_else(|| "(no subject)".to_string());
        let _span = info_span!("email_ingest", subject = %subject_label).entered();

        let job_id = email_job_id(Utc::now().timestamp());
        let mut tasks = Vec::new();
        let mut skipped = Vec::new();

        for doc in parsed.documents {
            let ext = sanitize::extension_of(&doc.filename).unwrap_or_default();
            if !doc.is_body && !config.is_allowed_extension(&ext) {
                warn!(attachment = %doc.filename, "Attachment type not accepted");
                skipped.push(doc.filename);
                continue;
            }

            let stored = email_stored_name(&doc.filename);
            let path = config.email_dir().join(&stored);
            let mut task = Task::new(
                new_task_id(),
                &job_id,
                TaskSource::Email,
                &doc.filename,
                stored,
                path,
            );
            if let Some(sender) = &parsed.sender {
                task = task.with_client_name(sender);
            }
            if let Some(subject) = &parsed.subject {
                task = task.with_email_subject(subject);
            }

            match self.intake.accept(task, &doc.content) {
                Ok(accepted) => tasks.push(accepted),
                Err(e) => warn!(attachment = %doc.filename, error = %e, "Cannot accept attachment"),
            }
        }

        if tasks.is_empty() {
            return Err(EmailError::NoDocuments {
                subject: subject_label,
            });
        }
        info!(job_id = %job_id, tasks = tasks.len(), "Email job created");

        Ok(IngestedEmail {
            job_id,
            subject: parsed.subject,
            sender: parsed.sender,
            tasks,
            skipped,
        })
    }
}

/// `email-<unix_ts>-<6 hex>`
pub fn email_job_id(unix_ts: i64) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("email-{}-{}", unix_ts, &uuid[..6])
}

/// `<sanitized stem>_<4 hex>.<ext>`
pub fn email_stored_name(original_filename: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    let (stem, ext) = safe_parts(original_filename);
    match ext {
        Some(ext) => format!("{}_{}.{}", stem, &uuid[..4], ext),
        None => format!("{}_{}", stem, &uuid[..4]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::email::parser::tests::sample_email;
    use crate::pipeline::{OfficeConverter, Pipeline, ThreadPageCounter};
    use crate::store::TaskStore;
    use crate::task::TaskStatus;
    use std::sync::Arc;
    use std::time::Duration;

    fn ingest(dir: &std::path::Path) -> (EmailIngest, TaskStore) {
        let config = Arc::new(Config::with_data_dir(dir));
        let store = TaskStore::open_in_memory().unwrap();
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            Arc::new(OfficeConverter::new(None, config.converted_dir())),
            Arc::new(ThreadPageCounter::new(Duration::from_secs(10))),
            2,
        ));
        let intake = Intake::new(config, store.clone(), pipeline);
        (EmailIngest::new(intake), store)
    }

    #[test]
    fn test_email_ids_and_names() {
        let job = email_job_id(1700000000);
        assert!(job.starts_with("email-1700000000-"));
        assert_eq!(job.len(), "email-1700000000-".len() + 6);

        let name = email_stored_name("chapter 1.pdf");
        assert!(name.starts_with("chapter_1_"));
        assert!(name.ends_with(".pdf"));
        assert_eq!(name.len(), "chapter_1_".len() + 4 + ".pdf".len());
    }

    #[tokio::test]
    async fn test_ingest_creates_one_job() {
        let dir = tempfile::tempdir().unwrap();
        let (ingest, store) = ingest(dir.path());

        let result = ingest.ingest(&sample_email()).unwrap();
        assert_eq!(result.skipped, ["setup.exe"]);
        assert_eq!(result.tasks.len(), 2);
        for accepted in result.tasks {
            accepted.finish().await;
        }

        let tasks = store.list_by_job(&result.job_id).unwrap();
        assert_eq!(tasks.len(), 2);
        for task in &tasks {
            assert_eq!(task.source, TaskSource::Email);
            assert_eq!(task.client_name.as_deref(), Some("alice@example.com"));
            assert_eq!(task.email_subject.as_deref(), Some("Thesis chapters"));
            assert!(task.input_path.starts_with(dir.path().join("email")));
        }
        let body = tasks
            .iter()
            .find(|t| t.original_filename == "email_body.txt")
            .unwrap();
        // No office suite in tests, so the text body cannot convert.
        assert_eq!(body.status, TaskStatus::ErrorConversion);
    }

    #[tokio::test]
    async fn test_nothing_printable() {
        let dir = tempfile::tempdir().unwrap();
        let (ingest, store) = ingest(dir.path());
        let raw = b"From: bob@example.com\r\nSubject: empty\r\n\r\n\r\n";

        let err = ingest.ingest(raw).unwrap_err();
        assert!(matches!(err, EmailError::NoDocuments { .. }));
        assert!(store.list_all().unwrap().is_empty());
    }
}
