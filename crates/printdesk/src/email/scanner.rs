//! Drop-folder scanner for raw `.eml` messages.
//!
//! Each message is ingested once, then moved to `processed/` or `failed/`
//! beside it so a rescan never sees it again.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{error, info, info_span, warn};
use walkdir::WalkDir;

use crate::sanitize;

use super::error::{EmailError, Result};
use super::ingest::{EmailIngest, IngestedEmail};

pub const PROCESSED_DIR: &str = "processed";
pub const FAILED_DIR: &str = "failed";

#[derive(Debug, Default)]
pub struct ScanReport {
    pub jobs: Vec<IngestedEmail>,
    pub failed: Vec<PathBuf>,
}

pub struct InboxScanner {
    ingest: EmailIngest,
    inbox_dir: PathBuf,
    interval: Duration,
}

impl InboxScanner {
    pub fn new(ingest: EmailIngest, inbox_dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            ingest,
            inbox_dir: inbox_dir.into(),
            interval,
        }
    }

    pub fn inbox_dir(&self) -> &Path {
        &self.inbox_dir
    }

    /// Ingests every `.eml` file currently in the inbox, oldest name first.
    pub fn scan_once(&self) -> Result<ScanReport> {
        let _span = info_span!("inbox_scan", inbox = %self.inbox_dir.display()).entered();
        std::fs::create_dir_all(&self.inbox_dir).map_err(|e| EmailError::Io {
            path: self.inbox_dir.clone(),
            source: e,
        })?;

        let mut report = ScanReport::default();
        for entry in WalkDir::new(&self.inbox_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_eml(path) {
                continue;
            }

            let outcome = std::fs::read(path)
                .map_err(|e| EmailError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
                .and_then(|raw| self.ingest.ingest(&raw));

            match outcome {
                Ok(job) => {
                    self.archive(path, PROCESSED_DIR)?;
                    report.jobs.push(job);
                }
                Err(e) => {
                    warn!(file = %sanitize::redact_path(path), error = %e, "Message not ingested");
                    report.failed.push(self.archive(path, FAILED_DIR)?);
                }
            }
        }

        if !report.jobs.is_empty() || !report.failed.is_empty() {
            info!(
                jobs = report.jobs.len(),
                failed = report.failed.len(),
                "Inbox scan finished"
            );
        }
        Ok(report)
    }

    /// Scans on every tick until the future is dropped.
    pub async fn run(&self) {
        let mut timer = tokio::time::interval(self.interval);
        loop {
            timer.tick().await;
            if let Err(e) = self.scan_once() {
                error!(error = %e, "Inbox scan failed");
            }
        }
    }

    fn archive(&self, path: &Path, folder: &str) -> Result<PathBuf> {
        let dir = self.inbox_dir.join(folder);
        std::fs::create_dir_all(&dir).map_err(|e| EmailError::Io {
            path: dir.clone(),
            source: e,
        })?;
        let target = dir.join(path.file_name().unwrap_or_default());
        std::fs::rename(path, &target).map_err(|e| EmailError::Io {
            path: target.clone(),
            source: e,
        })?;
        Ok(target)
    }
}

fn is_eml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("eml"))
        .unwrap_or(false)
}
