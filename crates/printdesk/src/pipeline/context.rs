use std::path::PathBuf;

use crate::task::Task;

/// What a producer hands to the pipeline for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    pub task_id: String,
    /// The uploaded or attached file.
    pub input_path: PathBuf,
    /// Collision-free name the converted PDF is derived from.
    pub stored_filename: String,
}

impl PipelineRequest {
    pub fn new(
        task_id: impl Into<String>,
        input_path: impl Into<PathBuf>,
        stored_filename: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            input_path: input_path.into(),
            stored_filename: stored_filename.into(),
        }
    }

    pub fn for_task(task: &Task) -> Self {
        Self::new(
            task.task_id.clone(),
            task.input_path.clone(),
            task.stored_filename.clone(),
        )
    }
}

/// Accumulates step results while one task moves through the pipeline.
#[derive(Debug)]
pub struct PipelineContext {
    pub request: PipelineRequest,
    pub input_size: Option<u64>,
    pub pdf_path: Option<PathBuf>,
    pub pages: Option<u32>,
}

impl PipelineContext {
    pub fn new(request: PipelineRequest) -> Self {
        Self {
            request,
            input_size: None,
            pdf_path: None,
            pages: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.request.task_id
    }
}
