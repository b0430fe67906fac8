//! Document-to-PDF conversion through an office suite running headless.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use crate::config::Config;
use crate::sanitize;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("No converter available: {0}")]
    ToolMissing(String),

    #[error("Failed to copy PDF to '{to}': {source}")]
    Copy {
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare conversion: {0}")]
    Prepare(#[source] std::io::Error),

    #[error("Failed to run converter: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Converter timed out after {0:?}")]
    Timeout(Duration),

    #[error("Converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Converter did not produce '{0}'")]
    NoOutput(PathBuf),
}

/// Turns one input document into a PDF in the conversion output area.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Converts `input` and returns the path of the produced PDF, named after
    /// `stored_filename`. On failure no partial output is left behind.
    async fn convert(&self, input: &Path, stored_filename: &str) -> Result<PathBuf, ConvertError>;
}

/// LibreOffice `--convert-to pdf` with a throwaway user profile per call.
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    program: Option<PathBuf>,
    output_dir: PathBuf,
    timeout: Duration,
    output_wait: Duration,
    poll_interval: Duration,
    settle: Duration,
}

impl OfficeConverter {
    pub fn new(program: Option<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program,
            output_dir: output_dir.into(),
            timeout: Duration::from_secs(120),
            output_wait: Duration::from_secs(20),
            poll_interval: Duration::from_millis(500),
            settle: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let settings = &config.converter;
        Self {
            program: settings.resolve_program(),
            output_dir: config.converted_dir(),
            timeout: settings.timeout(),
            output_wait: settings.output_wait(),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            settle: Duration::from_millis(settings.settle_ms),
        }
    }

    pub fn with_timeouts(mut self, timeout: Duration, output_wait: Duration) -> Self {
        self.timeout = timeout;
        self.output_wait = output_wait;
        self
    }

    pub fn with_polling(mut self, poll_interval: Duration, settle: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.settle = settle;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/<stem of stored_filename>.pdf`
    pub fn target_path(&self, stored_filename: &str) -> PathBuf {
        let stem = Path::new(stored_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(stored_filename);
        self.output_dir.join(format!("{}.pdf", stem))
    }

    /// Where the office suite writes its output for `input`: the input's
    /// own stem with a `.pdf` extension.
    fn produced_path(&self, input: &Path) -> PathBuf {
        let mut name = input.file_stem().map(OsString::from).unwrap_or_default();
        name.push(".pdf");
        self.output_dir.join(name)
    }

    async fn copy_pdf(&self, input: &Path, target: &Path) -> Result<(), ConvertError> {
        if input == target {
            return Ok(());
        }
        tokio::fs::copy(input, target)
            .await
            .map_err(|e| ConvertError::Copy {
                to: target.to_path_buf(),
                source: e,
            })?;
        Ok(())
    }

    async fn run_office(&self, input: &Path, target: &Path) -> Result<(), ConvertError> {
        let program = self.program.as_deref().ok_or_else(|| {
            ConvertError::ToolMissing("no LibreOffice binary configured or found".to_string())
        })?;
        if !program.is_file() {
            return Err(ConvertError::ToolMissing(format!(
                "'{}' does not exist",
                program.display()
            )));
        }

        // Removed on drop, whatever the outcome.
        let profile = tempfile::Builder::new()
            .prefix("lo_profile_")
            .tempdir()
            .map_err(ConvertError::Prepare)?;

        let mut command = TokioCommand::new(program);
        command
            .arg(format!(
                "-env:UserInstallation={}",
                file_url(profile.path())
            ))
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf:writer_pdf_Export")
            .arg("--outdir")
            .arg(&self.output_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %program.display(), "Launching converter");
        let child = command.spawn().map_err(ConvertError::Spawn)?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(ConvertError::Spawn)?,
            Err(_) => return Err(ConvertError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            return Err(ConvertError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // The converter names its output after the input file.
        let produced = self.produced_path(input);
        if !self.wait_for_output(&produced).await {
            return Err(ConvertError::NoOutput(produced));
        }
        tokio::time::sleep(self.settle).await;

        if produced != target {
            tokio::fs::rename(&produced, target)
                .await
                .map_err(|e| ConvertError::Copy {
                    to: target.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Polls until `path` exists with a non-zero size, or the wait window ends.
    async fn wait_for_output(&self, path: &Path) -> bool {
        let deadline = tokio::time::Instant::now() + self.output_wait;
        loop {
            if let Ok(meta) = tokio::fs::metadata(path).await {
                if meta.len() > 0 {
                    return true;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl DocumentConverter for OfficeConverter {
    async fn convert(&self, input: &Path, stored_filename: &str) -> Result<PathBuf, ConvertError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(ConvertError::Prepare)?;

        let target = self.target_path(stored_filename);
        let result = if is_pdf(input) {
            self.copy_pdf(input, &target).await
        } else {
            self.run_office(input, &target).await
        };

        match result {
            Ok(()) => Ok(target),
            Err(e) => {
                if input != target {
                    discard(&target).await;
                }
                if !is_pdf(input) {
                    discard(&self.produced_path(input)).await;
                }
                Err(e)
            }
        }
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(file = %sanitize::redact_path(path), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(file = %sanitize::redact_path(path), error = %e, "Cannot remove partial output"),
    }
}

/// `file://` URL for a local directory, as the office suite expects it.
fn file_url(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/").replace(' ', "%20");
    if raw.starts_with('/') {
        format!("file://{}", raw)
    } else {
        format!("file:///{}", raw)
    }
}
