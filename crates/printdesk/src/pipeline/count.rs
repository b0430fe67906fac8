//! Page counting in an isolated failure domain.
//!
//! PDF parsing can hang or bring down its caller on hostile input, so the
//! pipeline never parses in its own task. Two backends are provided: a
//! helper subprocess (the default) and a blocking thread with panic
//! containment. Either way a crash or hang surfaces as a [`CountError`],
//! while an unparseable document simply counts as zero pages.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command as TokioCommand;

use crate::config::{Config, CounterIsolation};
use crate::sanitize;

/// Subcommand the helper executable answers to.
pub const COUNT_PAGES_COMMAND: &str = "count-pages";

/// Binary that answers [`COUNT_PAGES_COMMAND`] when no helper is configured.
pub const HELPER_BINARY_NAME: &str = "printdesk";

#[derive(Error, Debug)]
pub enum CountError {
    #[error("Page counter timed out after {0:?}")]
    Timeout(Duration),

    #[error("Page counter crashed: {0}")]
    Crashed(String),

    #[error("Page counter could not run: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PageCounter: Send + Sync {
    /// Number of pages in `pdf`; `Ok(0)` when the document cannot be parsed.
    async fn count(&self, pdf: &Path) -> Result<u32, CountError>;
}

/// Counts pages with lopdf. Parse failures count as zero.
pub fn count_pages(path: &Path) -> u32 {
    match lopdf::Document::load(path) {
        Ok(doc) => u32::try_from(doc.get_pages().len()).unwrap_or(u32::MAX),
        Err(e) => {
            log::warn!(
                "Could not parse {} for page count: {}",
                sanitize::redact_path(path),
                e
            );
            0
        }
    }
}

/// Builds the configured counter backend.
pub fn counter_from_config(config: &Config) -> Box<dyn PageCounter> {
    let settings = &config.page_counter;
    match settings.isolation {
        CounterIsolation::Thread => Box::new(ThreadPageCounter::new(settings.timeout())),
        CounterIsolation::Subprocess => {
            let current = std::env::current_exe().ok();
            match resolve_helper(settings.helper.clone(), current.as_deref()) {
                Some(program) => Box::new(SubprocessPageCounter::new(program, settings.timeout())),
                None => {
                    log::warn!(
                        "No page-count helper configured and this is not the {} binary, using thread isolation",
                        HELPER_BINARY_NAME
                    );
                    Box::new(ThreadPageCounter::new(settings.timeout()))
                }
            }
        }
    }
}

/// The configured helper, else the running executable when it is the
/// `printdesk` binary. Any other host cannot answer `count-pages`.
pub fn resolve_helper(configured: Option<PathBuf>, current_exe: Option<&Path>) -> Option<PathBuf> {
    configured.or_else(|| {
        current_exe
            .filter(|exe| exe.file_stem().is_some_and(|stem| stem == HELPER_BINARY_NAME))
            .map(Path::to_path_buf)
    })
}

/// Runs the count on the blocking pool. A panic is reported as a crash; on
/// timeout the thread is abandoned.
pub struct ThreadPageCounter {
    timeout: Duration,
    count_fn: fn(&Path) -> u32,
}

impl ThreadPageCounter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            count_fn: count_pages,
        }
    }

    /// Substitutes the counting function.
    pub fn with_count_fn(timeout: Duration, count_fn: fn(&Path) -> u32) -> Self {
        Self { timeout, count_fn }
    }
}

#[async_trait]
impl PageCounter for ThreadPageCounter {
    async fn count(&self, pdf: &Path) -> Result<u32, CountError> {
        let path = pdf.to_path_buf();
        let count_fn = self.count_fn;
        let handle = tokio::task::spawn_blocking(move || count_fn(&path));

        match tokio::time::timeout(self.timeout, handle).await {
            Err(_) => Err(CountError::Timeout(self.timeout)),
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(join_err)) if join_err.is_panic() => {
                let payload = join_err.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic without message".to_string());
                Err(CountError::Crashed(message))
            }
            Ok(Err(join_err)) => Err(CountError::Crashed(join_err.to_string())),
        }
    }
}

/// Runs `<program> [args..] <pdf>` and reads one integer from stdout.
pub struct SubprocessPageCounter {
    program: PathBuf,
    args: Vec<OsString>,
    timeout: Duration,
}

impl SubprocessPageCounter {
    /// Helper invoked as `<program> count-pages <pdf>`.
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: vec![OsString::from(COUNT_PAGES_COMMAND)],
            timeout,
        }
    }

    /// Replaces the arguments placed before the PDF path.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl PageCounter for SubprocessPageCounter {
    async fn count(&self, pdf: &Path) -> Result<u32, CountError> {
        let child = TokioCommand::new(&self.program)
            .args(&self.args)
            .arg(pdf)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CountError::Unavailable(format!(
                    "cannot start '{}': {}",
                    self.program.display(),
                    e
                ))
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| CountError::Crashed(e.to_string()))?,
            Err(_) => return Err(CountError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CountError::Crashed(format!(
                "helper exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.trim().parse::<u32>().map_err(|_| {
            CountError::Unavailable(format!("unexpected helper output '{}'", stdout.trim()))
        })
    }
}
