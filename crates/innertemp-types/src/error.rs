//! Error types for data parsing in innertemp-types.

use thiserror::Error;

/// Errors that can occur when decoding a sensor notification.
///
/// A decode failure is always recoverable: the offending notification is
/// dropped and logged by the caller, and the next one is decoded normally.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload is shorter than the fixed frame layout.
    #[error("Insufficient data: frame requires {expected} bytes, got {actual}")]
    InsufficientData {
        /// Number of bytes the frame layout needs.
        expected: usize,
        /// Number of bytes actually received.
        actual: usize,
    },

    /// A numeric field did not hold a usable value.
    #[error("Malformed field '{field}': {reason}")]
    Malformed {
        /// Name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Returned when a sport name cannot be recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown sport: {0}")]
pub struct UnknownSport(pub String);

/// Result type alias for frame decoding.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
