//! Error types for logging setup

use std::path::PathBuf;

use thiserror::Error;

/// Failures while installing the global subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Cannot open log output at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot build rolling appender: {0}")]
    Appender(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Result type for logging setup
pub type LoggingResult<T> = Result<T, LoggingError>;
