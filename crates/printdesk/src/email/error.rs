//! Email intake error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::IntakeError;

#[derive(Error, Debug)]
pub enum EmailError {
    /// The message is not valid RFC 822.
    #[error("Failed to parse email: {0}")]
    Parse(String),

    /// Neither a usable attachment nor a text body.
    #[error("Email '{subject}' has nothing to print")]
    NoDocuments { subject: String },

    #[error("Inbox I/O on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan inbox: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Intake(#[from] IntakeError),
}

pub type Result<T> = std::result::Result<T, EmailError>;
