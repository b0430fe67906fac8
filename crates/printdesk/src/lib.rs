pub mod app;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod intake;
pub mod jobs;
pub mod pipeline;
pub mod pricing;
pub mod print;
pub mod sanitize;
pub mod store;
pub mod task;

pub use app::{PrintDesk, SubmittedJob};
pub use config::{load_config, Config};
pub use error::{ConfigError, IntakeError, PrintdeskError, Result};
pub use intake::{AcceptedTask, Intake};
pub use jobs::{JobOverview, JobState, JobStatusSnapshot, StaleSweeper};
pub use pipeline::{Pipeline, PipelineContext, PipelineRequest};
pub use pricing::{JobOptions, JobSummary, Money, PricingEngine, PrintOptions};
pub use print::{PrintExecutor, PrintReport, ReprintOptions};
pub use store::{PrintStats, StoreError, TaskStore};
pub use task::{Task, TaskStatus};
