//! Job pricing: per-task options, money, and the print-ready summary.

pub mod engine;
pub mod money;
pub mod options;

pub use engine::{JobSummary, PrintDescriptor, PricingEngine};
pub use money::Money;
pub use options::{Bound, JobOptions, PageSelection, PrintOptions};

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Job '{0}' has no printable tasks")]
    NoPrintableTasks(String),

    #[error("Invalid options for task '{task_id}': {reason}")]
    InvalidOptions { task_id: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
