//! The assembled print desk: one store shared by intake, pricing, printing
//! and the reaper.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};

use crate::config::Config;
use crate::db::Database;
use crate::email::{EmailIngest, InboxScanner, IngestedEmail};
use crate::error::{IntakeError, PrintdeskError, Result};
use crate::intake::{AcceptedTask, Intake};
use crate::jobs::{self, JobOverview, JobStatusSnapshot, StaleSweeper};
use crate::pipeline::Pipeline;
use crate::pricing::{JobOptions, JobSummary, PricingEngine};
use crate::print::{self, PrintExecutor, PrintReport, ReprintOptions};
use crate::store::{PrintStats, TaskStore};
use crate::task::new_job_id;

/// Documents accepted together under one new job.
#[derive(Debug)]
pub struct SubmittedJob {
    pub job_id: String,
    pub tasks: Vec<AcceptedTask>,
}

pub struct PrintDesk {
    config: Arc<Config>,
    store: TaskStore,
    intake: Intake,
    pricing: PricingEngine,
    executor: Arc<PrintExecutor>,
}

impl PrintDesk {
    /// Creates the working directories, opens the database and wires the
    /// configured converter, page counter and portal.
    pub fn open(config: Config) -> Result<Self> {
        for dir in [
            config.upload_dir(),
            config.converted_dir(),
            config.email_dir(),
            config.diagnostics_dir(),
        ] {
            create_dir(&dir)?;
        }

        let db = Database::open(&config.database_path())?;
        let store = TaskStore::new(db);
        let pipeline = Arc::new(Pipeline::from_config(&config, store.clone()));
        let executor = Arc::new(PrintExecutor::from_config(&config, store.clone()));

        info!("Print desk ready, data in {}", config.data_dir.display());
        Ok(Self::from_parts(config, store, pipeline, executor))
    }

    /// Assembles a desk from already-built parts.
    pub fn from_parts(
        config: Config,
        store: TaskStore,
        pipeline: Arc<Pipeline>,
        executor: Arc<PrintExecutor>,
    ) -> Self {
        let config = Arc::new(config);
        let intake = Intake::new(Arc::clone(&config), store.clone(), pipeline);
        let pricing = PricingEngine::from_config(&config.pricing);
        Self {
            config,
            store,
            intake,
            pricing,
            executor,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn intake(&self) -> &Intake {
        &self.intake
    }

    /// Uploads `files` as one new job. Rejected files are logged and
    /// skipped; nothing accepted at all is an error.
    pub fn submit_files(&self, files: &[PathBuf]) -> Result<SubmittedJob> {
        let job_id = new_job_id();
        let mut tasks = Vec::new();
        let mut last_error = None;

        for path in files {
            match self.intake.upload_file(&job_id, path) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    last_error = Some(e);
                }
            }
        }

        if tasks.is_empty() {
            return Err(last_error.unwrap_or(IntakeError::Empty).into());
        }
        Ok(SubmittedJob { job_id, tasks })
    }

    /// Uploads in-memory documents as one new job. Every name is checked
    /// before anything is stored, so a rejected document leaves no tasks.
    pub fn submit_documents(&self, documents: &[(String, Vec<u8>)]) -> Result<SubmittedJob> {
        if documents.is_empty() {
            return Err(IntakeError::Empty.into());
        }
        for (name, _) in documents {
            self.intake.check_extension(name)?;
        }
        let job_id = new_job_id();
        let tasks = documents
            .iter()
            .map(|(name, bytes)| self.intake.upload(&job_id, name, bytes))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(SubmittedJob { job_id, tasks })
    }

    pub fn ingest_email(&self, raw: &[u8]) -> Result<IngestedEmail> {
        Ok(self.email_ingest().ingest(raw)?)
    }

    pub fn email_ingest(&self) -> EmailIngest {
        EmailIngest::new(self.intake.clone())
    }

    /// Scanner over the configured inbox, if one is set.
    pub fn inbox_scanner(&self) -> Option<InboxScanner> {
        let email = &self.config.email;
        email.inbox_dir.as_ref().map(|dir| {
            InboxScanner::new(
                self.email_ingest(),
                dir,
                Duration::from_secs(email.poll_interval_secs),
            )
        })
    }

    /// Status of every task in `job_id`, reaping stale ones first.
    pub fn job_status(&self, job_id: &str) -> Result<JobStatusSnapshot> {
        Ok(jobs::job_status(
            &self.store,
            job_id,
            self.config.pipeline.stale_after(),
            Utc::now(),
        )?)
    }

    pub fn list_jobs(&self) -> Result<Vec<JobOverview>> {
        Ok(jobs::list_jobs(&self.store)?)
    }

    pub fn stats(&self) -> Result<PrintStats> {
        Ok(self.store.stats()?)
    }

    /// Prices the ready tasks of `job_id` and records the chosen options.
    pub fn quote(&self, job_id: &str, options: &JobOptions) -> Result<JobSummary> {
        Ok(self.pricing.calculate_summary(&self.store, job_id, options)?)
    }

    /// Quotes `job_id` and prints it to completion.
    pub async fn print(&self, job_id: &str, options: &JobOptions) -> Result<PrintReport> {
        let summary = self.quote(job_id, options)?;
        self.run_print(summary).await
    }

    /// Prints a quoted summary in the background.
    pub fn start_print(&self, summary: JobSummary) -> tokio::task::JoinHandle<PrintReport> {
        self.executor.spawn(summary)
    }

    pub async fn reprint_task(&self, task_id: &str, options: &ReprintOptions) -> Result<PrintReport> {
        let summary = print::reprint_task_summary(&self.store, &self.pricing, task_id, options)?;
        self.run_print(summary).await
    }

    pub async fn reprint_job(&self, job_id: &str, options: &ReprintOptions) -> Result<PrintReport> {
        let summary = print::reprint_job_summary(&self.store, &self.pricing, job_id, options)?;
        self.run_print(summary).await
    }

    /// Removes one task row. Files on disk are left alone.
    pub fn delete_task(&self, task_id: &str) -> Result<bool> {
        Ok(self.store.delete(task_id)?)
    }

    /// Removes every task row.
    pub fn purge(&self) -> Result<usize> {
        let removed = self.store.delete_all()?;
        info!("Purged {} task(s)", removed);
        Ok(removed)
    }

    /// Background reaper, when a sweep interval is configured.
    pub fn sweeper(&self) -> Option<StaleSweeper> {
        let settings = &self.config.pipeline;
        settings.sweep_interval_secs.map(|secs| {
            StaleSweeper::new(
                self.store.clone(),
                settings.stale_after(),
                Duration::from_secs(secs),
            )
        })
    }

    async fn run_print(&self, summary: JobSummary) -> Result<PrintReport> {
        let job_id = summary.job_id.clone();
        self.executor
            .spawn(summary)
            .await
            .map_err(|e| PrintdeskError::PrintAborted {
                job_id,
                reason: e.to_string(),
            })
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| PrintdeskError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}
