use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrintdeskError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Task store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),

    #[error("Pricing error: {0}")]
    Pricing(#[from] crate::pricing::PricingError),

    #[error("Reprint error: {0}")]
    Reprint(#[from] crate::print::ReprintError),

    #[error("Email error: {0}")]
    Email(#[from] crate::email::EmailError),

    #[error("Print run for job '{job_id}' did not complete: {reason}")]
    PrintAborted { job_id: String, reason: String },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Producer-side failures while accepting a document.
#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("File type not allowed: '{0}'")]
    DisallowedExtension(String),

    #[error("Failed to write '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Nothing to submit")]
    Empty,

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

pub type Result<T> = std::result::Result<T, PrintdeskError>;
