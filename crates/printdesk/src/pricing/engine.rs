use std::path::PathBuf;

use serde::Serialize;

use crate::config::PricingConfig;
use crate::store::TaskStore;
use crate::task::{PaperSize, Task, TaskUpdate};

use super::options::{JobOptions, PageSelection, PrintOptions};
use super::{Money, PricingError};

/// One task as handed to the print executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrintDescriptor {
    pub task_id: String,
    pub filename: String,
    /// Absolute path of the converted PDF.
    pub pdf_path: PathBuf,
    /// 0 when the page count was never established.
    pub pages: u32,
    pub copies: u32,
    pub is_color: bool,
    pub is_duplex: bool,
    pub paper_size: PaperSize,
    pub selection: PageSelection,
    pub price: Money,
}

impl PrintDescriptor {
    pub fn has_page_count(&self) -> bool {
        self.pages > 0
    }
}

/// A priced, print-ready job. Consumed by exactly one print run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub tasks: Vec<PrintDescriptor>,
    pub total: Money,
}

impl JobSummary {
    pub fn new(job_id: impl Into<String>, tasks: Vec<PrintDescriptor>) -> Self {
        let total = tasks.iter().map(|t| t.price).sum();
        Self {
            job_id: job_id.into(),
            tasks,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingEngine {
    mono_rate: Money,
    color_rate: Money,
}

impl PricingEngine {
    pub fn new(mono_rate: Money, color_rate: Money) -> Self {
        Self {
            mono_rate,
            color_rate,
        }
    }

    pub fn from_config(config: &PricingConfig) -> Self {
        Self::new(
            Money::from_decimal(config.mono_rate),
            Money::from_decimal(config.color_rate),
        )
    }

    pub fn rate(&self, color: bool) -> Money {
        if color {
            self.color_rate
        } else {
            self.mono_rate
        }
    }

    /// Prices `task` under `options` without touching the store.
    ///
    /// An unknown page count prices at zero and always prints the whole
    /// document.
    pub fn describe(&self, task: &Task, pdf_path: PathBuf, options: &PrintOptions) -> PrintDescriptor {
        let (selection, price) = if task.pages == 0 {
            (PageSelection::All, Money::ZERO)
        } else {
            let selection = options.page_selection();
            let pages = selection.page_count(task.pages);
            let price = self
                .rate(options.color)
                .times(u64::from(pages))
                .times(u64::from(options.copies));
            (selection, price)
        };

        PrintDescriptor {
            task_id: task.task_id.clone(),
            filename: task.original_filename.clone(),
            pdf_path,
            pages: task.pages,
            copies: options.copies,
            is_color: options.color,
            is_duplex: options.duplex,
            paper_size: options.paper_size,
            selection,
            price,
        }
    }

    /// Prices every printable task of `job_id` that has options, persists
    /// the options and price on each, and returns the ordered summary.
    ///
    /// Tasks that are not `Ready`/`ReadyNoCount`, or have no options, are
    /// skipped.
    pub fn calculate_summary(
        &self,
        store: &TaskStore,
        job_id: &str,
        options: &JobOptions,
    ) -> Result<JobSummary, PricingError> {
        let mut eligible = Vec::new();
        for task in store.list_by_job(job_id)? {
            if !task.status.is_ready() {
                continue;
            }
            let Some(opts) = options.get(&task.task_id) else {
                continue;
            };
            let Some(pdf_path) = task.source_path.clone() else {
                log::warn!("Task {} is ready without a converted PDF, skipped", task.task_id);
                continue;
            };
            if opts.copies == 0 {
                return Err(PricingError::InvalidOptions {
                    task_id: task.task_id.clone(),
                    reason: "copies must be at least 1".to_string(),
                });
            }
            eligible.push((task, pdf_path, opts));
        }

        if eligible.is_empty() {
            return Err(PricingError::NoPrintableTasks(job_id.to_string()));
        }

        let mut descriptors = Vec::with_capacity(eligible.len());
        for (task, pdf_path, opts) in eligible {
            let descriptor = self.describe(&task, pdf_path, opts);
            store.update(&task.task_id, &persisted_fields(&descriptor))?;
            descriptors.push(descriptor);
        }

        let summary = JobSummary::new(job_id, descriptors);
        log::info!(
            "Priced job {}: {} task(s), total {}",
            job_id,
            summary.tasks.len(),
            summary.total
        );
        Ok(summary)
    }
}

fn persisted_fields(descriptor: &PrintDescriptor) -> TaskUpdate {
    TaskUpdate {
        copies: Some(descriptor.copies),
        is_color: Some(descriptor.is_color),
        is_duplex: Some(descriptor.is_duplex),
        paper_size: Some(descriptor.paper_size),
        page_mode: Some(descriptor.selection.mode()),
        range: Some(descriptor.selection.bounds()),
        price: Some(descriptor.price),
        ..Default::default()
    }
}
