//! Error types for innertemp-core.
//!
//! Nothing in this crate is fatal. Every error below degrades the companion
//! to "disconnected" or "no data" and is reported as a
//! [`CompanionEvent::Error`](crate::events::CompanionEvent::Error) or a log
//! line; the caller decides whether to scan again.
//!
//! # Recovery
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::Bluetooth`] | Close, then scan again | Platform stack failure, link state unknown |
//! | [`Error::NoAdapter`] | Do not retry | Bluetooth is off or absent |
//! | [`Error::ScanFailed`] | Scan again on user request | Scans are never retried automatically |
//! | [`Error::LinkLost`] | Scan again | Sensor out of range or powered off |
//! | [`Error::NoUsableCharacteristic`] | Do not retry | Firmware does not expose the frame characteristic |
//! | [`Error::DeviceNotFound`] | Scan again | Address no longer known to the adapter |
//! | [`Error::PermissionDenied`] | Grant permission | Operation was a no-op |
//! | [`Error::Decode`] | Ignore | One notification is lost, the next decodes normally |

use thiserror::Error;

use innertemp_types::DecodeError;

/// Errors that can occur while talking to the sensor.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth adapter is available.
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    /// The platform refused to start or continue a scan.
    #[error("Scan failed: {0}")]
    ScanFailed(String),

    /// The link to the sensor dropped.
    #[error("Link to {address} lost")]
    LinkLost {
        /// Address of the peripheral that went away.
        address: String,
    },

    /// Neither the expected characteristic nor any fallback candidate exists.
    #[error("No usable characteristic (searched {service_count} services)")]
    NoUsableCharacteristic {
        /// Number of services that were searched.
        service_count: usize,
    },

    /// The requested peripheral is unknown to the adapter.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The operation needs a permission that has not been granted.
    #[error("Permission denied: {0}")]
    PermissionDenied(&'static str),

    /// No peripheral is currently linked.
    #[error("Not connected to device")]
    NotConnected,

    /// The driver or one of its channels has shut down.
    #[error("Channel closed")]
    ChannelClosed,

    /// A notification could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl Error {
    /// Create a device not found error for a specific address.
    pub fn device_not_found(address: impl Into<String>) -> Self {
        Self::DeviceNotFound(address.into())
    }

    /// Create a link lost error for a specific address.
    pub fn link_lost(address: impl Into<String>) -> Self {
        Self::LinkLost {
            address: address.into(),
        }
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

/// Result type alias using innertemp-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
