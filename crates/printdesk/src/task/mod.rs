//! Task data model and lifecycle state machine.

pub mod model;
pub mod status;

pub use model::{PageMode, PaperSize, Task, TaskSource, TaskUpdate};
pub use status::{TaskStatus, UnknownStatus};

/// Generates a fresh task id (`task-<32 hex>`).
pub fn new_task_id() -> String {
    format!("task-{}", uuid::Uuid::new_v4().simple())
}

/// Generates a fresh upload job id (`job-<uuid>`).
pub fn new_job_id() -> String {
    format!("job-{}", uuid::Uuid::new_v4())
}
