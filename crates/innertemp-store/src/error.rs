//! Error types for innertemp-store.

use std::path::PathBuf;

/// Result type for innertemp-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in innertemp-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Failed to create the data directory.
    #[error("Failed to create data directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A row of a session file could not be parsed.
    #[error("Malformed line {line}: {reason}")]
    MalformedLine { line: u64, reason: String },

    /// Year, month and day do not form a calendar date.
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

impl Error {
    pub(crate) fn malformed(line: u64, reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            line,
            reason: reason.into(),
        }
    }
}
