//! Email intake: raw messages become jobs.

pub mod error;
pub mod ingest;
pub mod parser;
pub mod scanner;

pub use error::EmailError;
pub use ingest::{email_job_id, email_stored_name, EmailIngest, IngestedEmail};
pub use parser::{parse_email, EmailDocument, ParsedEmail};
pub use scanner::{InboxScanner, ScanReport};
