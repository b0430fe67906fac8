//! Mapping between `tasks` rows and [`Task`].

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::pricing::Money;
use crate::task::{PageMode, PaperSize, Task, TaskSource, TaskStatus};

use super::StoreError;

/// A raw task row, columns as stored.
#[derive(Debug, Clone)]
pub(crate) struct TaskRow {
    pub task_id: String,
    pub job_id: String,
    pub source: String,
    pub original_filename: String,
    pub stored_filename: String,
    pub input_path: String,
    pub source_path: Option<String>,
    pub status: String,
    pub pages: i64,
    pub copies: i64,
    pub is_color: bool,
    pub is_duplex: bool,
    pub paper_size: Option<String>,
    pub page_mode: String,
    pub range_start: Option<i64>,
    pub range_end: Option<i64>,
    pub price_cents: i64,
    pub client_name: Option<String>,
    pub email_subject: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRow {
    pub fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            task_id: row.get("task_id")?,
            job_id: row.get("job_id")?,
            source: row.get("source")?,
            original_filename: row.get("original_filename")?,
            stored_filename: row.get("stored_filename")?,
            input_path: row.get("input_path")?,
            source_path: row.get("source_path")?,
            status: row.get("status")?,
            pages: row.get("pages")?,
            copies: row.get("copies")?,
            is_color: row.get("is_color")?,
            is_duplex: row.get("is_duplex")?,
            paper_size: row.get("paper_size")?,
            page_mode: row.get("page_mode")?,
            range_start: row.get("range_start")?,
            range_end: row.get("range_end")?,
            price_cents: row.get("price_cents")?,
            client_name: row.get("client_name")?,
            email_subject: row.get("email_subject")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            job_id: task.job_id.clone(),
            source: task.source.as_str().to_string(),
            original_filename: task.original_filename.clone(),
            stored_filename: task.stored_filename.clone(),
            input_path: path_to_string(&task.input_path),
            source_path: task.source_path.as_deref().map(path_to_string),
            status: task.status.as_str().to_string(),
            pages: i64::from(task.pages),
            copies: i64::from(task.copies),
            is_color: task.is_color,
            is_duplex: task.is_duplex,
            paper_size: task.paper_size.map(|p| p.as_str().to_string()),
            page_mode: task.page_mode.as_str().to_string(),
            range_start: task.range_start.map(i64::from),
            range_end: task.range_end.map(i64::from),
            price_cents: cents_to_column(task.price),
            client_name: task.client_name.clone(),
            email_subject: task.email_subject.clone(),
            created_at: format_timestamp(&task.created_at),
            updated_at: format_timestamp(&task.updated_at),
        }
    }

    pub fn into_task(self) -> Result<Task, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            task_id: self.task_id.clone(),
            reason,
        };

        let status: TaskStatus = self.status.parse().map_err(|e| corrupt(format!("{}", e)))?;
        let source: TaskSource = self.source.parse().map_err(corrupt)?;
        let page_mode: PageMode = self.page_mode.parse().map_err(corrupt)?;
        let paper_size = match self.paper_size.as_deref() {
            Some(raw) => Some(raw.parse::<PaperSize>().map_err(corrupt)?),
            None => None,
        };
        let created_at = parse_timestamp(&self.created_at).map_err(corrupt)?;
        let updated_at = parse_timestamp(&self.updated_at).map_err(corrupt)?;

        Ok(Task {
            status,
            source,
            page_mode,
            paper_size,
            created_at,
            updated_at,
            pages: clamp_u32(self.pages),
            copies: clamp_u32(self.copies).max(1),
            range_start: self.range_start.map(clamp_u32),
            range_end: self.range_end.map(clamp_u32),
            price: Money::from_cents(self.price_cents.max(0) as u64),
            is_color: self.is_color,
            is_duplex: self.is_duplex,
            input_path: PathBuf::from(&self.input_path),
            source_path: self.source_path.as_ref().map(PathBuf::from),
            original_filename: self.original_filename,
            stored_filename: self.stored_filename,
            client_name: self.client_name,
            email_subject: self.email_subject,
            job_id: self.job_id,
            task_id: self.task_id,
        })
    }
}

pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{}': {}", raw, e))
}

pub(crate) fn path_to_string(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn cents_to_column(money: Money) -> i64 {
    i64::try_from(money.cents()).unwrap_or(i64::MAX)
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
