use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::task::PaperSize;

/// Top-level configuration. Every field has a default, so `{}` is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: PathBuf,
    pub upload_dir: Option<PathBuf>,
    pub converted_dir: Option<PathBuf>,
    pub email_dir: Option<PathBuf>,
    pub diagnostics_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub allowed_extensions: Vec<String>,
    pub converter: ConverterConfig,
    pub page_counter: PageCounterConfig,
    pub pipeline: PipelineSettings,
    pub pricing: PricingConfig,
    pub portal: PortalConfig,
    pub email: EmailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            upload_dir: None,
            converted_dir: None,
            email_dir: None,
            diagnostics_dir: None,
            database_path: None,
            allowed_extensions: default_allowed_extensions(),
            converter: ConverterConfig::default(),
            page_counter: PageCounterConfig::default(),
            pipeline: PipelineSettings::default(),
            pricing: PricingConfig::default(),
            portal: PortalConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

impl Config {
    /// Config rooted at `data_dir`, everything else default.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.resolve(&self.upload_dir, "uploads")
    }

    pub fn converted_dir(&self) -> PathBuf {
        self.resolve(&self.converted_dir, "converted")
    }

    pub fn email_dir(&self) -> PathBuf {
        self.resolve(&self.email_dir, "email")
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.resolve(&self.diagnostics_dir, "diagnostics")
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database_path, "printdesk.db")
    }

    /// Case-insensitive check against `allowed_extensions`.
    pub fn is_allowed_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    fn resolve(&self, explicit: &Option<PathBuf>, name: &str) -> PathBuf {
        explicit
            .clone()
            .unwrap_or_else(|| self.data_dir.join(name))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("printdesk"))
        .unwrap_or_else(|| PathBuf::from("printdesk-data"))
}

fn default_allowed_extensions() -> Vec<String> {
    [
        "pdf", "png", "jpg", "jpeg", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods",
        "txt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Office-suite converter invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// LibreOffice binary. Detected on PATH when absent.
    pub program: Option<PathBuf>,
    pub timeout_secs: u64,
    /// How long to wait for the output file after the converter exits.
    pub output_wait_secs: u64,
    pub poll_interval_ms: u64,
    /// Pause after the output appears, for converters that flush late.
    pub settle_ms: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: None,
            timeout_secs: 120,
            output_wait_secs: 20,
            poll_interval_ms: 500,
            settle_ms: 1000,
        }
    }
}

impl ConverterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn output_wait(&self) -> Duration {
        Duration::from_secs(self.output_wait_secs)
    }

    /// Configured program, or the first LibreOffice binary found.
    pub fn resolve_program(&self) -> Option<PathBuf> {
        self.program.clone().or_else(detect_libreoffice)
    }
}

fn detect_libreoffice() -> Option<PathBuf> {
    let candidates = ["soffice", "libreoffice"];
    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            for name in candidates {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }

    [
        "/usr/bin/soffice",
        "/usr/lib/libreoffice/program/soffice",
        "/opt/libreoffice/program/soffice",
        "/Applications/LibreOffice.app/Contents/MacOS/soffice",
        "C:\\Program Files\\LibreOffice\\program\\soffice.exe",
    ]
    .iter()
    .map(Path::new)
    .find(|p| p.is_file())
    .map(Path::to_path_buf)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterIsolation {
    /// Re-run the current executable with `count-pages`.
    #[default]
    Subprocess,
    /// Blocking thread with panic containment.
    Thread,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageCounterConfig {
    pub timeout_secs: u64,
    pub isolation: CounterIsolation,
    /// Helper executable for subprocess isolation. Defaults to the running
    /// exe when that is the `printdesk` binary, otherwise thread isolation.
    pub helper: Option<PathBuf>,
}

impl Default for PageCounterConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            isolation: CounterIsolation::Subprocess,
            helper: None,
        }
    }
}

impl PageCounterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_concurrent: usize,
    /// Tasks still processing after this long are failed by the reaper.
    pub stale_after_secs: u64,
    /// Background sweep period. Reaping stays lazy when unset.
    pub sweep_interval_secs: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrent: num_cpus::get(),
            stale_after_secs: 180,
            sweep_interval_secs: None,
        }
    }
}

impl PipelineSettings {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Per-page rates in currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub mono_rate: f64,
    pub color_rate: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            mono_rate: 0.20,
            color_rate: 0.70,
        }
    }
}

/// CSS selectors for the portal's single-document submission form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSelectors {
    pub start_button: String,
    pub color_mode: String,
    pub duplex_checkbox: String,
    pub duplex_type: String,
    pub media_size: String,
    pub copies_input: String,
    pub page_mode_range: String,
    pub start_page_input: String,
    pub end_page_input: String,
    pub page_mode_all: String,
    pub file_input: String,
    pub return_button: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            start_button: "#start_button".to_string(),
            color_mode: "select[name=\"ColorMode\"]".to_string(),
            duplex_checkbox: "#DuplexMode".to_string(),
            duplex_type: "select[name=\"DuplexType\"]".to_string(),
            media_size: "select[name=\"MediaSize\"]".to_string(),
            copies_input: "#Copies".to_string(),
            page_mode_range: "#PageModeRange".to_string(),
            start_page_input: "#StartPage".to_string(),
            end_page_input: "#EndPage".to_string(),
            page_mode_all: "#PageModeAll".to_string(),
            file_input: "input[name=\"File\"]".to_string(),
            return_button: "#return_button".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Direct-print page of the printer's web interface.
    pub url: String,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    /// Upper bound for waiting on a single element or page transition.
    pub ui_wait_secs: u64,
    /// Upper bound for a whole protocol step.
    pub step_timeout_secs: u64,
    pub selectors: PortalSelectors,
    /// Fragment the URL contains once a submission is accepted.
    pub success_url_contains: String,
    pub color_value: String,
    pub mono_value: String,
    pub duplex_type_value: String,
    /// Option values of the media-size select, per paper size.
    pub paper_sizes: BTreeMap<PaperSize, String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        let mut paper_sizes = BTreeMap::new();
        paper_sizes.insert(PaperSize::A4, "2".to_string());
        paper_sizes.insert(PaperSize::A3, "1".to_string());

        Self {
            url: "http://192.168.1.18/direct".to_string(),
            headless: true,
            chrome_executable: None,
            window_width: 1920,
            window_height: 1080,
            ui_wait_secs: 60,
            step_timeout_secs: 90,
            selectors: PortalSelectors::default(),
            success_url_contains: "direct_print_ok".to_string(),
            color_value: "0".to_string(),
            mono_value: "1".to_string(),
            duplex_type_value: "2".to_string(),
            paper_sizes,
        }
    }
}

impl PortalConfig {
    pub fn ui_wait(&self) -> Duration {
        Duration::from_secs(self.ui_wait_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Drop folder of raw `.eml` messages.
    pub inbox_dir: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub body_filename: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            inbox_dir: None,
            poll_interval_secs: 60,
            body_filename: "email_body.txt".to_string(),
        }
    }
}
