//! Seam between the print executor and the browser that drives the portal.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::task::PaperSize;

use super::step::PrintStep;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Failed to start browser: {0}")]
    Launch(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element '{0}' did not appear")]
    ElementMissing(String),

    #[error("Portal did not confirm the submission: {0}")]
    NotConfirmed(String),

    #[error("No portal value configured for paper size {0}")]
    UnsupportedPaperSize(PaperSize),

    #[error("Step '{step}' timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },

    #[error("Failed to save diagnostic: {0}")]
    Diagnostic(String),
}

/// One live automation session. Every task of a job goes through the same
/// session, one after another.
#[async_trait]
pub trait PortalSession: Send {
    async fn perform(&mut self, step: &PrintStep) -> Result<(), PortalError>;

    /// Saves whatever the portal is showing to `path` for postmortem.
    async fn capture_diagnostic(&mut self, path: &Path) -> Result<(), PortalError>;

    async fn close(&mut self) -> Result<(), PortalError>;
}

#[async_trait]
pub trait PortalLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PortalSession>, PortalError>;
}
