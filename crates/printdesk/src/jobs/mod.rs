//! Job-level views over the task store.

pub mod overview;
pub mod status;

pub use overview::{list_jobs, JobOverview, JobState};
pub use status::{
    is_stale, job_status, reap_stale, sweep_stale, JobStatusSnapshot, StaleSweeper,
    TaskStatusView,
};
