//! Durable task store.
//!
//! Every mutation is a field-scoped `UPDATE` keyed by `task_id`. Status
//! changes are compare-and-set: the `WHERE` clause only matches rows whose
//! current status may legally move to the new one, so a late writer can
//! never drag a task backwards past a concurrent one.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::types::ToSql;
use rusqlite::{params, ErrorCode, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

use crate::db::{Database, DatabaseError};
use crate::pricing::Money;
use crate::task::{Task, TaskStatus, TaskUpdate};

mod row;

use row::{cents_to_column, format_timestamp, path_to_string, TaskRow};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Task '{0}' already exists")]
    DuplicateTask(String),

    #[error("Task '{0}' not found")]
    NotFound(String),

    #[error("Task '{task_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Task '{task_id}' has an unreadable row: {reason}")]
    Corrupt { task_id: String, reason: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(DatabaseError::Sqlite(err))
    }
}

/// Aggregate figures over printed tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrintStats {
    pub revenue: Money,
    /// Sum of `pages * copies` over printed tasks with a known page count.
    pub pages_printed: u64,
    pub tasks_printed: u64,
}

enum UpdateOutcome {
    Applied,
    Missing,
    Rejected(String),
}

/// Cheap to clone; all clones share one database handle.
#[derive(Clone)]
pub struct TaskStore {
    db: Database,
}

impl TaskStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Inserts a new task. Fails if the id is already taken.
    pub fn insert(&self, task: &Task) -> Result<(), StoreError> {
        let row = TaskRow::from_task(task);
        let result = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (task_id, job_id, source, original_filename, stored_filename,
                 input_path, source_path, status, pages, copies, is_color, is_duplex, paper_size,
                 page_mode, range_start, range_end, price_cents, client_name, email_subject,
                 created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19, ?20, ?21)",
                params![
                    row.task_id,
                    row.job_id,
                    row.source,
                    row.original_filename,
                    row.stored_filename,
                    row.input_path,
                    row.source_path,
                    row.status,
                    row.pages,
                    row.copies,
                    row.is_color,
                    row.is_duplex,
                    row.paper_size,
                    row.page_mode,
                    row.range_start,
                    row.range_end,
                    row.price_cents,
                    row.client_name,
                    row.email_subject,
                    row.created_at,
                    row.updated_at,
                ],
            )?;
            Ok(())
        });

        match result {
            Err(DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(e, _)))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateTask(task.task_id.clone()))
            }
            other => other.map_err(StoreError::from),
        }
    }

    /// Applies only the fields set in `update`.
    ///
    /// A status change is rejected with [`StoreError::InvalidTransition`]
    /// when the stored status cannot move to it; nothing is written then.
    pub fn update(&self, task_id: &str, update: &TaskUpdate) -> Result<(), StoreError> {
        let mut assignments: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        let mut set = |column: &str, value: Box<dyn ToSql>| {
            values.push(value);
            assignments.push(format!("{} = ?{}", column, values.len()));
        };

        if let Some(status) = update.status {
            set("status", Box::new(status.as_str()));
        }
        if let Some(pages) = update.pages {
            set("pages", Box::new(i64::from(pages)));
        }
        if let Some(ref path) = update.source_path {
            set("source_path", Box::new(path_to_string(path)));
        }
        if let Some(copies) = update.copies {
            set("copies", Box::new(i64::from(copies)));
        }
        if let Some(is_color) = update.is_color {
            set("is_color", Box::new(is_color));
        }
        if let Some(is_duplex) = update.is_duplex {
            set("is_duplex", Box::new(is_duplex));
        }
        if let Some(paper_size) = update.paper_size {
            set("paper_size", Box::new(paper_size.as_str()));
        }
        if let Some(page_mode) = update.page_mode {
            set("page_mode", Box::new(page_mode.as_str()));
        }
        if let Some(range) = update.range {
            set("range_start", Box::new(range.map(|(start, _)| i64::from(start))));
            set("range_end", Box::new(range.map(|(_, end)| i64::from(end))));
        }
        if let Some(price) = update.price {
            set("price_cents", Box::new(cents_to_column(price)));
        }
        if let Some(ref created_at) = update.created_at {
            set("created_at", Box::new(format_timestamp(created_at)));
        }
        set("updated_at", Box::new(format_timestamp(&Utc::now())));

        values.push(Box::new(task_id.to_string()));
        let mut sql = format!(
            "UPDATE tasks SET {} WHERE task_id = ?{}",
            assignments.join(", "),
            values.len()
        );

        if let Some(next) = update.status {
            let allowed: Vec<String> = TaskStatus::ALL
                .iter()
                .filter(|from| from.can_transition_to(next))
                .map(|from| format!("'{}'", from.as_str()))
                .collect();
            sql.push_str(&format!(" AND status IN ({})", allowed.join(", ")));
        }

        let outcome = self.db.with_conn(|conn| {
            let params_ref: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
            let changed = conn.execute(&sql, params_ref.as_slice())?;
            if changed > 0 {
                return Ok(UpdateOutcome::Applied);
            }
            let current: Option<String> = conn
                .query_row(
                    "SELECT status FROM tasks WHERE task_id = ?1",
                    params![task_id],
                    |r| r.get(0),
                )
                .optional()?;
            Ok(match current {
                Some(status) => UpdateOutcome::Rejected(status),
                None => UpdateOutcome::Missing,
            })
        })?;

        match outcome {
            UpdateOutcome::Applied => Ok(()),
            UpdateOutcome::Missing => {
                log::warn!("Update for unknown task {} ignored", task_id);
                Err(StoreError::NotFound(task_id.to_string()))
            }
            UpdateOutcome::Rejected(current) => {
                let from = current.parse().map_err(|e| StoreError::Corrupt {
                    task_id: task_id.to_string(),
                    reason: format!("{}", e),
                })?;
                let to = update.status.unwrap_or(from);
                log::warn!("Task {} refused transition {} -> {}", task_id, from, to);
                Err(StoreError::InvalidTransition {
                    task_id: task_id.to_string(),
                    from,
                    to,
                })
            }
        }
    }

    /// Convenience for the common status-only update.
    pub fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        self.update(task_id, &TaskUpdate::status(status))
    }

    pub fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let row = self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM tasks WHERE task_id = ?1",
                    params![task_id],
                    TaskRow::from_row,
                )
                .optional()?;
            Ok(row)
        })?;
        row.map(TaskRow::into_task).transpose()
    }

    /// Tasks of one job in submission order.
    pub fn list_by_job(&self, job_id: &str) -> Result<Vec<Task>, StoreError> {
        self.select(
            "SELECT * FROM tasks WHERE job_id = ?1 ORDER BY rowid ASC",
            &[&job_id],
        )
    }

    /// Every task, newest first.
    pub fn list_all(&self) -> Result<Vec<Task>, StoreError> {
        self.select(
            "SELECT * FROM tasks ORDER BY created_at DESC, rowid DESC",
            &[],
        )
    }

    /// Tasks still owed work by the pipeline, oldest first.
    pub fn list_processing(&self) -> Result<Vec<Task>, StoreError> {
        let statuses: Vec<String> = TaskStatus::ALL
            .iter()
            .filter(|s| s.is_processing())
            .map(|s| format!("'{}'", s.as_str()))
            .collect();
        let sql = format!(
            "SELECT * FROM tasks WHERE status IN ({}) ORDER BY created_at ASC",
            statuses.join(", ")
        );
        self.select(&sql, &[])
    }

    pub fn delete(&self, task_id: &str) -> Result<bool, StoreError> {
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM tasks WHERE task_id = ?1", params![task_id])?)
        })?;
        Ok(removed > 0)
    }

    pub fn delete_all(&self) -> Result<usize, StoreError> {
        let removed = self
            .db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM tasks", [])?))?;
        log::info!("Deleted {} tasks", removed);
        Ok(removed)
    }

    /// Revenue and volume over successfully printed tasks.
    pub fn stats(&self) -> Result<PrintStats, StoreError> {
        let (revenue, pages, printed): (i64, i64, i64) = self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COALESCE(SUM(price_cents), 0),
                        COALESCE(SUM(CASE WHEN pages > 0 THEN pages * copies ELSE 0 END), 0),
                        COUNT(*)
                 FROM tasks WHERE status IN (?1, ?2)",
                params![
                    TaskStatus::PrintSuccess.as_str(),
                    TaskStatus::PrintSuccessNoCount.as_str()
                ],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?)
        })?;

        Ok(PrintStats {
            revenue: Money::from_cents(revenue.max(0) as u64),
            pages_printed: pages.max(0) as u64,
            tasks_printed: printed.max(0) as u64,
        })
    }

    /// Task counts per status.
    pub fn count_by_status(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        let counts = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
            let rows = stmt
                .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        Ok(counts
            .into_iter()
            .map(|(status, n)| (status, n.max(0) as u64))
            .collect())
    }

    fn select(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<Task>, StoreError> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params, TaskRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{PageMode, PaperSize, TaskSource};
    use chrono::Duration;

    fn test_store() -> TaskStore {
        TaskStore::open_in_memory().expect("Failed to create test store")
    }

    fn sample_task(id: &str, job: &str) -> Task {
        Task::new(
            id,
            job,
            TaskSource::Upload,
            "report.docx",
            format!("1700000000_{}_report.docx", id),
            format!("/tmp/uploads/{}.docx", id),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let store = test_store();
        let task = sample_task("t1", "j1").with_client_name("alice@example.com");
        store.insert(&task).unwrap();

        let found = store.get("t1").unwrap().unwrap();
        assert_eq!(found.job_id, "j1");
        assert_eq!(found.status, TaskStatus::Queued);
        assert_eq!(found.client_name.as_deref(), Some("alice@example.com"));
        assert_eq!(found.input_path, task.input_path);
    }

    #[test]
    fn test_get_missing_is_none() {
        assert!(test_store().get("nope").unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_fails() {
        let store = test_store();
        store.insert(&sample_task("dup", "j1")).unwrap();
        let err = store.insert(&sample_task("dup", "j2")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTask(ref id) if id == "dup"));
    }

    #[test]
    fn test_update_touches_only_given_fields() {
        let store = test_store();
        let mut task = sample_task("t1", "j1");
        task.is_color = true;
        store.insert(&task).unwrap();

        store
            .update("t1", &TaskUpdate::status(TaskStatus::Converting))
            .unwrap();

        let found = store.get("t1").unwrap().unwrap();
        assert_eq!(found.status, TaskStatus::Converting);
        assert!(found.is_color);
        assert_eq!(found.original_filename, "report.docx");
    }

    #[test]
    fn test_update_print_options() {
        let store = test_store();
        store
            .insert(&sample_task("t1", "j1").with_status(TaskStatus::Ready))
            .unwrap();

        let update = TaskUpdate {
            copies: Some(3),
            is_duplex: Some(true),
            paper_size: Some(PaperSize::A3),
            page_mode: Some(PageMode::Range),
            range: Some(Some((2, 5))),
            price: Some(Money::from_cents(840)),
            ..Default::default()
        };
        store.update("t1", &update).unwrap();

        let found = store.get("t1").unwrap().unwrap();
        assert_eq!(found.copies, 3);
        assert!(found.is_duplex);
        assert_eq!(found.paper_size, Some(PaperSize::A3));
        assert_eq!(found.page_range(), Some((2, 5)));
        assert_eq!(found.price, Money::from_cents(840));

        store
            .update(
                "t1",
                &TaskUpdate {
                    page_mode: Some(PageMode::All),
                    range: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        let found = store.get("t1").unwrap().unwrap();
        assert!(found.range_start.is_none());
        assert!(found.range_end.is_none());
    }

    #[test]
    fn test_update_missing_task() {
        let err = test_store()
            .set_status("ghost", TaskStatus::Converting)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_backward_transition_rejected() {
        let store = test_store();
        store
            .insert(&sample_task("t1", "j1").with_status(TaskStatus::ErrorConversion))
            .unwrap();

        let err = store.set_status("t1", TaskStatus::Ready).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: TaskStatus::ErrorConversion,
                to: TaskStatus::Ready,
                ..
            }
        ));
        assert_eq!(
            store.get("t1").unwrap().unwrap().status,
            TaskStatus::ErrorConversion
        );
    }

    #[test]
    fn test_rejected_transition_writes_nothing() {
        let store = test_store();
        store
            .insert(&sample_task("t1", "j1").with_status(TaskStatus::ErrorConversion))
            .unwrap();

        let update = TaskUpdate::status(TaskStatus::Ready).with_pages(9);
        assert!(store.update("t1", &update).is_err());
        assert_eq!(store.get("t1").unwrap().unwrap().pages, 0);
    }

    #[test]
    fn test_list_by_job_in_submission_order() {
        let store = test_store();
        let base = Utc::now() - Duration::minutes(10);
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let task = sample_task(id, "job").with_created_at(base + Duration::seconds(i as i64));
            store.insert(&task).unwrap();
        }
        store.insert(&sample_task("other", "job-2")).unwrap();

        let ids: Vec<String> = store
            .list_by_job("job")
            .unwrap()
            .into_iter()
            .map(|t| t.task_id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_list_by_job_ignores_restarted_clock() {
        let store = test_store();
        store.insert(&sample_task("first", "job")).unwrap();
        store.insert(&sample_task("second", "job")).unwrap();

        // The later upload starts converting first.
        store
            .update(
                "second",
                &TaskUpdate::status(TaskStatus::Converting).with_created_at(Utc::now()),
            )
            .unwrap();
        store
            .update(
                "first",
                &TaskUpdate::status(TaskStatus::Converting)
                    .with_created_at(Utc::now() + Duration::seconds(5)),
            )
            .unwrap();

        let ids: Vec<String> = store
            .list_by_job("job")
            .unwrap()
            .into_iter()
            .map(|t| t.task_id)
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn test_list_all_newest_first() {
        let store = test_store();
        let base = Utc::now() - Duration::minutes(10);
        store
            .insert(&sample_task("old", "j1").with_created_at(base))
            .unwrap();
        store
            .insert(&sample_task("new", "j2").with_created_at(base + Duration::minutes(5)))
            .unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all[0].task_id, "new");
        assert_eq!(all[1].task_id, "old");
    }

    #[test]
    fn test_list_processing() {
        let store = test_store();
        store.insert(&sample_task("q", "j")).unwrap();
        store
            .insert(&sample_task("c", "j").with_status(TaskStatus::Counting))
            .unwrap();
        store
            .insert(&sample_task("r", "j").with_status(TaskStatus::Ready))
            .unwrap();

        let mut ids: Vec<String> = store
            .list_processing()
            .unwrap()
            .into_iter()
            .map(|t| t.task_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["c", "q"]);
    }

    #[test]
    fn test_delete_and_delete_all() {
        let store = test_store();
        store.insert(&sample_task("t1", "j")).unwrap();
        store.insert(&sample_task("t2", "j")).unwrap();

        assert!(store.delete("t1").unwrap());
        assert!(!store.delete("t1").unwrap());
        assert_eq!(store.delete_all().unwrap(), 1);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_stats_cover_printed_tasks_only() {
        let store = test_store();

        let mut printed = sample_task("p1", "j").with_status(TaskStatus::PrintSuccess);
        printed.pages = 10;
        printed.copies = 2;
        printed.price = Money::from_cents(1400);
        store.insert(&printed).unwrap();

        let mut no_count = sample_task("p2", "j").with_status(TaskStatus::PrintSuccessNoCount);
        no_count.copies = 4;
        store.insert(&no_count).unwrap();

        let mut failed = sample_task("p3", "j").with_status(TaskStatus::PrintFailed);
        failed.pages = 3;
        failed.price = Money::from_cents(60);
        store.insert(&failed).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.revenue, Money::from_cents(1400));
        assert_eq!(stats.pages_printed, 20);
        assert_eq!(stats.tasks_printed, 2);
    }

    #[test]
    fn test_count_by_status() {
        let store = test_store();
        store.insert(&sample_task("a", "j")).unwrap();
        store.insert(&sample_task("b", "j")).unwrap();
        store
            .insert(&sample_task("c", "j").with_status(TaskStatus::Ready))
            .unwrap();

        let counts = store.count_by_status().unwrap();
        assert_eq!(counts.get("QUEUED"), Some(&2));
        assert_eq!(counts.get("READY"), Some(&1));
    }

    #[test]
    fn test_concurrent_updates_on_different_rows() {
        let store = test_store();
        for i in 0..8 {
            store.insert(&sample_task(&format!("t{}", i), "j")).unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let id = format!("t{}", i);
                    store.set_status(&id, TaskStatus::Converting).unwrap();
                    store.set_status(&id, TaskStatus::Counting).unwrap();
                    store
                        .update(&id, &TaskUpdate::status(TaskStatus::Ready).with_pages(i + 1))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for (i, task) in store.list_by_job("j").unwrap().iter().enumerate() {
            assert_eq!(task.status, TaskStatus::Ready);
            assert!(task.pages >= 1, "task {} has pages", i);
        }
    }
}
