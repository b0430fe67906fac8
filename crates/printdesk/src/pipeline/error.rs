use std::path::PathBuf;

use thiserror::Error;

use crate::store::StoreError;
use crate::task::TaskStatus;

use super::convert::ConvertError;
use super::count::CountError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Input file is empty")]
    EmptyInput,

    #[error("Cannot read input '{path}': {source}")]
    UnreadableInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Conversion failed: {0}")]
    Conversion(#[from] ConvertError),

    #[error("Page count failed: {0}")]
    Counting(#[from] CountError),

    #[error("Task store rejected an update: {0}")]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Terminal status recorded for this failure, or `None` when the failure
    /// is the store itself and nothing more can be written.
    pub fn failure_status(&self) -> Option<TaskStatus> {
        match self {
            PipelineError::EmptyInput => Some(TaskStatus::ErrorEmptyFile),
            PipelineError::UnreadableInput { .. } => Some(TaskStatus::ErrorConversion),
            PipelineError::Conversion(_) => Some(TaskStatus::ErrorConversion),
            PipelineError::Counting(CountError::Unavailable(_)) => Some(TaskStatus::ErrorPageCount),
            PipelineError::Counting(_) => Some(TaskStatus::ErrorFatalRead),
            PipelineError::Store(_) => None,
        }
    }
}
