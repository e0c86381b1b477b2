//! Error type shared by every stage of a run.

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Error, Debug)]
pub enum FragilityError {
    #[error("No GTFS archive resource found in catalog package {package_id:?}")]
    ResourceNotFound { package_id: String },

    #[error("Malformed clock time {text:?}")]
    MalformedTime { text: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Feed archive has no {0}")]
    MissingTable(&'static str),

    #[error("File error: {0}")]
    FileError(String),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Another run holds the lock at {path:?}")]
    RunInProgress { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, FragilityError>;
