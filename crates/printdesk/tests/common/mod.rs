//! Shared fixtures for printdesk integration tests.
//!
//! - PDF generation with lopdf
//! - A converter that copies instead of launching an office suite
//! - A scripted portal that records steps and fails where told

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lopdf::{dictionary, Document, Object, Stream};
use tempfile::TempDir;

use printdesk::pipeline::{ConvertError, DocumentConverter, Pipeline, ThreadPageCounter};
use printdesk::print::{PortalError, PortalLauncher, PortalSession, PrintExecutor, PrintStep};
use printdesk::task::{new_task_id, Task, TaskSource, TaskStatus, TaskUpdate};
use printdesk::{Config, TaskStore};

/// Writes an `n`-page PDF into `dir`.
pub fn write_pdf(dir: &Path, name: &str, pages: usize) -> PathBuf {
    std::fs::write(dir.join(name), pdf_bytes(pages)).expect("write pdf");
    dir.join(name)
}

pub fn pdf_bytes(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for i in 0..pages {
        let text = format!("BT /F1 18 Tf 72 720 Td (Sheet {}) Tj ET", i + 1);
        let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => resources_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize pdf");
    bytes
}

/// Copies the input into the output area under the stored name's stem.
pub struct CopyConverter {
    pub output_dir: PathBuf,
    pub calls: AtomicUsize,
}

impl CopyConverter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentConverter for CopyConverter {
    async fn convert(&self, input: &Path, stored_filename: &str) -> Result<PathBuf, ConvertError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(ConvertError::Prepare)?;
        let stem = Path::new(stored_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(stored_filename);
        let target = self.output_dir.join(format!("{}.pdf", stem));
        tokio::fs::copy(input, &target)
            .await
            .map_err(|e| ConvertError::Copy {
                to: target.clone(),
                source: e,
            })?;
        Ok(target)
    }
}

/// How a [`ScriptedPortal`] session misbehaves.
#[derive(Debug, Clone, Copy, Default)]
pub enum Script {
    #[default]
    Succeed,
    /// The n-th attach (1-based, counted across the session) fails.
    FailAttach(usize),
    /// The n-th confirmation wait never returns.
    HangConfirmation(usize),
    /// The browser never starts.
    FailLaunch,
}

/// What the fake portal saw, shared with the test.
#[derive(Default)]
pub struct PortalLog {
    pub steps: Mutex<Vec<String>>,
    pub attached: Mutex<Vec<PathBuf>>,
    pub diagnostics: Mutex<Vec<PathBuf>>,
    pub closed: AtomicBool,
    pub launches: AtomicUsize,
}

impl PortalLog {
    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }

    pub fn attached(&self) -> Vec<PathBuf> {
        self.attached.lock().unwrap().clone()
    }
}

pub struct ScriptedPortal {
    pub script: Script,
    pub log: Arc<PortalLog>,
}

impl ScriptedPortal {
    pub fn new(script: Script) -> (Arc<Self>, Arc<PortalLog>) {
        let log = Arc::new(PortalLog::default());
        let portal = Arc::new(Self {
            script,
            log: Arc::clone(&log),
        });
        (portal, log)
    }
}

#[async_trait]
impl PortalLauncher for ScriptedPortal {
    async fn launch(&self) -> Result<Box<dyn PortalSession>, PortalError> {
        self.log.launches.fetch_add(1, Ordering::SeqCst);
        if matches!(self.script, Script::FailLaunch) {
            return Err(PortalError::Launch("no browser in test".to_string()));
        }
        Ok(Box::new(ScriptedSession {
            script: self.script,
            log: Arc::clone(&self.log),
            attaches: 0,
            confirmations: 0,
        }))
    }
}

struct ScriptedSession {
    script: Script,
    log: Arc<PortalLog>,
    attaches: usize,
    confirmations: usize,
}

#[async_trait]
impl PortalSession for ScriptedSession {
    async fn perform(&mut self, step: &PrintStep) -> Result<(), PortalError> {
        self.log.steps.lock().unwrap().push(step.name().to_string());
        match step {
            PrintStep::AttachDocument(path) => {
                self.attaches += 1;
                if let Script::FailAttach(n) = self.script {
                    if n == self.attaches {
                        return Err(PortalError::ElementMissing("#fileInput".to_string()));
                    }
                }
                self.log.attached.lock().unwrap().push(path.clone());
            }
            PrintStep::AwaitConfirmation => {
                self.confirmations += 1;
                if let Script::HangConfirmation(n) = self.script {
                    if n == self.confirmations {
                        std::future::pending::<()>().await;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn capture_diagnostic(&mut self, path: &Path) -> Result<(), PortalError> {
        std::fs::write(path, b"\x89PNG fake").map_err(|e| PortalError::Diagnostic(e.to_string()))?;
        self.log.diagnostics.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PortalError> {
        self.log.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// An isolated data directory with a config rooted in it.
pub struct TestDesk {
    pub temp_dir: TempDir,
    pub config: Config,
    pub store: TaskStore,
}

impl TestDesk {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let config = Config::with_data_dir(temp_dir.path());
        let store = TaskStore::open_in_memory().expect("store");
        for dir in [
            config.upload_dir(),
            config.converted_dir(),
            config.email_dir(),
            config.diagnostics_dir(),
        ] {
            std::fs::create_dir_all(dir).expect("create dir");
        }
        Self {
            temp_dir,
            config,
            store,
        }
    }

    pub fn pipeline(&self) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            self.store.clone(),
            Arc::new(CopyConverter::new(self.config.converted_dir())),
            Arc::new(ThreadPageCounter::new(Duration::from_secs(10))),
            4,
        ))
    }

    pub fn executor(&self, portal: Arc<ScriptedPortal>, step_timeout: Duration) -> PrintExecutor {
        PrintExecutor::new(
            self.store.clone(),
            portal,
            step_timeout,
            self.config.diagnostics_dir(),
        )
    }

    /// Inserts a task that is already `Ready` with a converted PDF of
    /// `pages` pages (`0` stores a file lopdf cannot read).
    pub fn ready_task(&self, job_id: &str, name: &str, pages: usize) -> Task {
        let converted = self.config.converted_dir();
        let pdf = if pages == 0 {
            let path = converted.join(name);
            std::fs::write(&path, b"%PDF-1.4 unreadable").expect("write pdf");
            path
        } else {
            write_pdf(&converted, name, pages)
        };
        let status = if pages == 0 {
            TaskStatus::ReadyNoCount
        } else {
            TaskStatus::Ready
        };

        let task = Task::new(
            new_task_id(),
            job_id,
            TaskSource::Upload,
            name,
            name,
            self.config.upload_dir().join(name),
        );
        self.store.insert(&task).expect("insert");
        self.store
            .update(&task.task_id, &TaskUpdate::status(TaskStatus::Converting))
            .expect("converting");
        self.store
            .update(
                &task.task_id,
                &TaskUpdate::status(TaskStatus::Counting).with_source_path(pdf.clone()),
            )
            .expect("counting");
        self.store
            .update(
                &task.task_id,
                &TaskUpdate::status(status).with_pages(pages as u32),
            )
            .expect("ready");
        self.store.get(&task.task_id).expect("get").expect("exists")
    }

    pub fn status_of(&self, task_id: &str) -> TaskStatus {
        self.store
            .get(task_id)
            .expect("get")
            .expect("task exists")
            .status
    }
}
