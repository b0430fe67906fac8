//! Print execution against the printer's web portal.

pub mod chrome;
pub mod executor;
pub mod portal;
pub mod reprint;
pub mod step;

pub use chrome::ChromePortal;
pub use executor::{PrintExecutor, PrintReport};
pub use portal::{PortalError, PortalLauncher, PortalSession};
pub use reprint::{reprint_job_summary, reprint_task_summary, ReprintError, ReprintOptions};
pub use step::PrintStep;
