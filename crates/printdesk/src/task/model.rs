use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pricing::Money;

use super::status::TaskStatus;

/// Where a task's document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSource {
    Upload,
    Email,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSource::Upload => "upload",
            TaskSource::Email => "email",
        }
    }
}

impl FromStr for TaskSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(TaskSource::Upload),
            "email" => Ok(TaskSource::Email),
            other => Err(format!("unknown task source '{}'", other)),
        }
    }
}

/// Sheet format offered by the print portal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PaperSize {
    A3,
    #[default]
    A4,
    A5,
    Letter,
    Legal,
}

impl PaperSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperSize::A3 => "a3",
            PaperSize::A4 => "a4",
            PaperSize::A5 => "a5",
            PaperSize::Letter => "letter",
            PaperSize::Legal => "legal",
        }
    }
}

impl fmt::Display for PaperSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaperSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "a3" => Ok(PaperSize::A3),
            "a4" => Ok(PaperSize::A4),
            "a5" => Ok(PaperSize::A5),
            "letter" => Ok(PaperSize::Letter),
            "legal" => Ok(PaperSize::Legal),
            other => Err(format!("unknown paper size '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageMode {
    #[default]
    All,
    Range,
}

impl PageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageMode::All => "all",
            PageMode::Range => "range",
        }
    }
}

impl FromStr for PageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(PageMode::All),
            "range" => Ok(PageMode::Range),
            other => Err(format!("unknown page mode '{}'", other)),
        }
    }
}

/// One physical document, from submission to print outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub task_id: String,
    pub job_id: String,
    pub source: TaskSource,
    pub original_filename: String,
    pub stored_filename: String,
    /// The uploaded or attached file as written by the producer.
    pub input_path: PathBuf,
    /// The converted PDF, once conversion succeeded.
    pub source_path: Option<PathBuf>,
    pub status: TaskStatus,
    /// 0 means unknown.
    pub pages: u32,
    pub copies: u32,
    pub is_color: bool,
    pub is_duplex: bool,
    pub paper_size: Option<PaperSize>,
    pub page_mode: PageMode,
    pub range_start: Option<u32>,
    pub range_end: Option<u32>,
    pub price: Money,
    pub client_name: Option<String>,
    pub email_subject: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A freshly submitted task in `Queued`, with default print options.
    pub fn new(
        task_id: impl Into<String>,
        job_id: impl Into<String>,
        source: TaskSource,
        original_filename: impl Into<String>,
        stored_filename: impl Into<String>,
        input_path: impl Into<PathBuf>,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            job_id: job_id.into(),
            source,
            original_filename: original_filename.into(),
            stored_filename: stored_filename.into(),
            input_path: input_path.into(),
            source_path: None,
            status: TaskStatus::Queued,
            pages: 0,
            copies: 1,
            is_color: false,
            is_duplex: false,
            paper_size: None,
            page_mode: PageMode::All,
            range_start: None,
            range_end: None,
            price: Money::ZERO,
            client_name: None,
            email_subject: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());
        self
    }

    pub fn with_email_subject(mut self, subject: impl Into<String>) -> Self {
        self.email_subject = Some(subject.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }

    /// The page range recorded at pricing time, if ranged printing was chosen.
    pub fn page_range(&self) -> Option<(u32, u32)> {
        match (self.page_mode, self.range_start, self.range_end) {
            (PageMode::Range, Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

/// A field-scoped change to one task. Only the `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub pages: Option<u32>,
    pub source_path: Option<PathBuf>,
    pub copies: Option<u32>,
    pub is_color: Option<bool>,
    pub is_duplex: Option<bool>,
    pub paper_size: Option<PaperSize>,
    pub page_mode: Option<PageMode>,
    /// `Some(None)` clears both bounds.
    pub range: Option<Option<(u32, u32)>>,
    pub price: Option<Money>,
    /// Restarts the staleness clock.
    pub created_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_pages(mut self, pages: u32) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskUpdate::default()
    }
}
