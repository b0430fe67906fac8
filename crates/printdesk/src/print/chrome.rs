//! Headless Chrome driving the printer's direct-print form.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::PortalConfig;
use crate::pricing::PageSelection;
use crate::sanitize;
use crate::task::PaperSize;

use super::portal::{PortalError, PortalLauncher, PortalSession};
use super::step::PrintStep;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches one browser per print run.
#[derive(Debug, Clone)]
pub struct ChromePortal {
    config: PortalConfig,
}

impl ChromePortal {
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PortalLauncher for ChromePortal {
    async fn launch(&self) -> Result<Box<dyn PortalSession>, PortalError> {
        let cfg = &self.config;
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(cfg.window_width, cfg.window_height)
            .request_timeout(cfg.ui_wait())
            .arg("--disable-dev-shm-usage")
            .arg("--ignore-certificate-errors");
        if !cfg.headless {
            builder = builder.with_head();
        }
        if let Some(exe) = &cfg.chrome_executable {
            builder = builder.chrome_executable(exe);
        }
        let browser_config = builder.build().map_err(PortalError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| PortalError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(PortalError::Launch(e.to_string()));
            }
        };
        debug!(url = %cfg.url, "Browser ready");

        Ok(Box::new(ChromeSession {
            browser,
            page,
            handler: handler_task,
            config: cfg.clone(),
            closed: false,
        }))
    }
}

struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    config: PortalConfig,
    closed: bool,
}

impl ChromeSession {
    /// Polls for `selector` until the UI wait runs out.
    async fn wait_for(&self, selector: &str) -> Result<Element, PortalError> {
        let deadline = tokio::time::Instant::now() + self.config.ui_wait();
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                return Ok(element);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PortalError::ElementMissing(selector.to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Runs a script that returns `false` when `selector` matched nothing.
    async fn run_on(&self, selector: &str, script: String) -> Result<(), PortalError> {
        let found: bool = self
            .page
            .evaluate(script)
            .await
            .map_err(browser_error)?
            .into_value()
            .map_err(|e| PortalError::Browser(e.to_string()))?;
        if found {
            Ok(())
        } else {
            Err(PortalError::ElementMissing(selector.to_string()))
        }
    }

    async fn set_value(&self, selector: &str, value: &str) -> Result<(), PortalError> {
        self.wait_for(selector).await?;
        self.run_on(selector, set_value_script(selector, value)).await
    }

    async fn click_js(&self, selector: &str) -> Result<(), PortalError> {
        self.wait_for(selector).await?;
        self.run_on(selector, click_script(selector)).await
    }

    async fn click(&self, selector: &str) -> Result<(), PortalError> {
        self.wait_for(selector)
            .await?
            .click()
            .await
            .map_err(browser_error)?;
        Ok(())
    }

    async fn select_pages(&self, selection: PageSelection) -> Result<(), PortalError> {
        let sel = &self.config.selectors;
        match selection {
            PageSelection::All => self.click_js(&sel.page_mode_all).await,
            PageSelection::Range { start, end } => {
                self.click_js(&sel.page_mode_range).await?;
                self.set_value(&sel.start_page_input, &start.to_string())
                    .await?;
                self.set_value(&sel.end_page_input, &end.to_string()).await
            }
        }
    }

    fn paper_value(&self, size: PaperSize) -> Result<&str, PortalError> {
        self.config
            .paper_sizes
            .get(&size)
            .map(String::as_str)
            .ok_or(PortalError::UnsupportedPaperSize(size))
    }

    async fn attach(&self, pdf: &Path) -> Result<(), PortalError> {
        let input = self.wait_for(&self.config.selectors.file_input).await?;
        let absolute = std::path::absolute(pdf)
            .map_err(|e| PortalError::Browser(format!("cannot resolve {}: {}", pdf.display(), e)))?;

        let mut params = SetFileInputFilesParams::new(vec![absolute.to_string_lossy().into_owned()]);
        params.backend_node_id = Some(input.backend_node_id.clone());
        self.page.execute(params).await.map_err(browser_error)?;
        debug!(file = %sanitize::redact_path(pdf), "Document attached");
        Ok(())
    }

    async fn await_confirmation(&self) -> Result<(), PortalError> {
        let marker = &self.config.success_url_contains;
        let deadline = tokio::time::Instant::now() + self.config.ui_wait();
        loop {
            let url = self.page.url().await.map_err(browser_error)?;
            if url.as_deref().is_some_and(|u| u.contains(marker.as_str())) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PortalError::NotConfirmed(url.unwrap_or_default()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PortalSession for ChromeSession {
    async fn perform(&mut self, step: &PrintStep) -> Result<(), PortalError> {
        let sel = &self.config.selectors;
        match step {
            PrintStep::OpenForm => {
                self.page
                    .goto(self.config.url.as_str())
                    .await
                    .map_err(browser_error)?;
                self.wait_for(&sel.start_button).await.map(|_| ())
            }
            PrintStep::SelectColor(color) => {
                let value = if *color {
                    &self.config.color_value
                } else {
                    &self.config.mono_value
                };
                self.set_value(&sel.color_mode, value).await
            }
            PrintStep::EnableDuplex => {
                self.wait_for(&sel.duplex_checkbox).await?;
                self.run_on(&sel.duplex_checkbox, check_script(&sel.duplex_checkbox))
                    .await?;
                self.set_value(&sel.duplex_type, &self.config.duplex_type_value)
                    .await
            }
            PrintStep::SelectPaperSize(size) => {
                let value = self.paper_value(*size)?;
                self.set_value(&sel.media_size, value).await
            }
            PrintStep::SetCopies(copies) => {
                self.set_value(&sel.copies_input, &copies.to_string()).await
            }
            PrintStep::SelectPages(selection) => self.select_pages(*selection).await,
            PrintStep::AttachDocument(pdf) => self.attach(pdf).await,
            PrintStep::Submit => self.click(&sel.start_button).await,
            PrintStep::AwaitConfirmation => self.await_confirmation().await,
            PrintStep::AwaitReturn => self.wait_for(&sel.return_button).await.map(|_| ()),
            PrintStep::ReturnToForm => self.click(&sel.return_button).await,
        }
    }

    async fn capture_diagnostic(&mut self, path: &Path) -> Result<(), PortalError> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page
            .save_screenshot(params, path)
            .await
            .map_err(|e| PortalError::Diagnostic(e.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PortalError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = match self.browser.close().await {
            Ok(_) => self
                .browser
                .wait()
                .await
                .map(|_| ())
                .map_err(|e| PortalError::Browser(e.to_string())),
            Err(e) => Err(browser_error(e)),
        };
        self.handler.abort();
        result
    }
}

fn browser_error(err: chromiumoxide::error::CdpError) -> PortalError {
    PortalError::Browser(err.to_string())
}

/// A JavaScript string literal.
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn set_value_script(selector: &str, value: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
         el.value = {val}; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
         return true; }})()",
        sel = js_str(selector),
        val = js_str(value),
    )
}

fn click_script(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
         el.click(); return true; }})()",
        sel = js_str(selector),
    )
}

fn check_script(selector: &str) -> String {
    format!(
        "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
         if (!el.checked) el.click(); return true; }})()",
        sel = js_str(selector),
    )
}
