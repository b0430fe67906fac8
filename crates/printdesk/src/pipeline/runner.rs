use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::sanitize;
use crate::store::TaskStore;
use crate::task::{TaskStatus, TaskUpdate};

use super::context::{PipelineContext, PipelineRequest};
use super::convert::{ConvertError, DocumentConverter, OfficeConverter};
use super::count::{counter_from_config, PageCounter};
use super::error::PipelineError;

/// Drives queued tasks through conversion and page counting.
///
/// Each task runs independently; the limiter only bounds how many external
/// tools are busy at once. A task waiting for a permit stays `Queued`.
pub struct Pipeline {
    store: TaskStore,
    converter: Arc<dyn DocumentConverter>,
    counter: Arc<dyn PageCounter>,
    limiter: Arc<Semaphore>,
}

impl Pipeline {
    pub fn new(
        store: TaskStore,
        converter: Arc<dyn DocumentConverter>,
        counter: Arc<dyn PageCounter>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            converter,
            counter,
            limiter: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn from_config(config: &Config, store: TaskStore) -> Self {
        Self::new(
            store,
            Arc::new(OfficeConverter::from_config(config)),
            Arc::from(counter_from_config(config)),
            config.pipeline.max_concurrent,
        )
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Runs the pipeline on its own tokio task.
    pub fn spawn(self: &Arc<Self>, request: PipelineRequest) -> JoinHandle<Option<TaskStatus>> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run(request).await })
    }

    /// Runs one task to `Ready`, `ReadyNoCount` or an error state.
    ///
    /// Returns the status written last, or `None` when the store refused an
    /// update (task deleted or reaped meanwhile) and the run was abandoned.
    pub async fn run(&self, request: PipelineRequest) -> Option<TaskStatus> {
        let span = info_span!("pipeline",
            task_id = %request.task_id,
            filename = %sanitize::redact_path(&request.input_path),
        );
        self.run_inner(request).instrument(span).await
    }

    async fn run_inner(&self, request: PipelineRequest) -> Option<TaskStatus> {
        let _permit = match Arc::clone(&self.limiter).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("Pipeline limiter closed, task left queued");
                return None;
            }
        };

        let mut ctx = PipelineContext::new(request);
        match self.drive(&mut ctx).await {
            Ok(status) => {
                info!(status = %status, pages = ctx.pages.unwrap_or(0), "Task processed");
                Some(status)
            }
            Err(e) => self.record_failure(&ctx, e),
        }
    }

    async fn drive(&self, ctx: &mut PipelineContext) -> Result<TaskStatus, PipelineError> {
        // Step 1: Reject empty or unreadable input before any tool runs
        self.step_check_input(ctx)
            .instrument(info_span!("check_input"))
            .await?;

        // Step 2: Mark converting and restart the staleness clock
        {
            let _step = info_span!("start_conversion").entered();
            self.store.update(
                ctx.task_id(),
                &TaskUpdate::status(TaskStatus::Converting).with_created_at(Utc::now()),
            )?;
        }

        // Step 3: Convert
        self.step_convert(ctx)
            .instrument(info_span!("convert"))
            .await?;

        // Step 4: Confirm the PDF and mark counting
        {
            let _step = info_span!("start_counting").entered();
            self.step_start_counting(ctx)?;
        }

        // Step 5: Count in the isolated context
        self.step_count(ctx)
            .instrument(info_span!("count_pages"))
            .await
    }

    async fn step_check_input(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let path = ctx.request.input_path.clone();
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| PipelineError::UnreadableInput { path, source: e })?;
        if meta.len() == 0 {
            return Err(PipelineError::EmptyInput);
        }
        ctx.input_size = Some(meta.len());
        debug!(bytes = meta.len(), "Input accepted");
        Ok(())
    }

    async fn step_convert(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let pdf = self
            .converter
            .convert(&ctx.request.input_path, &ctx.request.stored_filename)
            .await?;
        debug!(pdf = %sanitize::redact_path(&pdf), "Conversion finished");
        ctx.pdf_path = Some(pdf);
        Ok(())
    }

    fn step_start_counting(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let pdf = ctx
            .pdf_path
            .clone()
            .filter(|p| is_non_empty_file(p))
            .ok_or_else(|| {
                ConvertError::NoOutput(
                    ctx.pdf_path
                        .clone()
                        .unwrap_or_else(|| ctx.request.input_path.clone()),
                )
            })?;
        self.store.update(
            ctx.task_id(),
            &TaskUpdate::status(TaskStatus::Counting).with_source_path(pdf),
        )?;
        Ok(())
    }

    async fn step_count(&self, ctx: &mut PipelineContext) -> Result<TaskStatus, PipelineError> {
        let Some(pdf) = ctx.pdf_path.clone() else {
            return Err(ConvertError::NoOutput(ctx.request.input_path.clone()).into());
        };
        let pages = self.counter.count(&pdf).await?;
        ctx.pages = Some(pages);

        let status = if pages > 0 {
            TaskStatus::Ready
        } else {
            warn!("Page count unavailable, task is printable without a price");
            TaskStatus::ReadyNoCount
        };
        self.store
            .update(ctx.task_id(), &TaskUpdate::status(status).with_pages(pages))?;
        Ok(status)
    }

    fn record_failure(&self, ctx: &PipelineContext, err: PipelineError) -> Option<TaskStatus> {
        let Some(status) = err.failure_status() else {
            warn!(error = %err, "Task abandoned");
            return None;
        };
        match self
            .store
            .update(ctx.task_id(), &TaskUpdate::status(status))
        {
            Ok(()) => {
                warn!(status = %status, error = %err, "Task failed");
                Some(status)
            }
            Err(e) => {
                error!(status = %status, error = %err, store_error = %e, "Cannot record task failure");
                None
            }
        }
    }
}

fn is_non_empty_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
