//! Platform-agnostic types for the InnerTemp wearable temperature sensor.
//!
//! This crate holds everything that does not touch Bluetooth or the
//! filesystem, so it can be shared by the BLE layer (innertemp-core) and
//! the session store (innertemp-store).
//!
//! # Features
//!
//! - Sensor frame decoding and rounding rules
//! - Session and history types (`Sport`, `TemperatureEntry`, statistics)
//! - Temperature classification and per-athlete threshold ranges
//! - UUID constants for the sensor's GATT layout
//! - The [`SessionSink`] seam between the pipeline and the store
//!
//! # Example
//!
//! ```
//! use innertemp_types::{SensorFrame, Sport};
//!
//! let mut payload = Vec::new();
//! for value in [34.0f32, 2.5, 91.0] {
//!     payload.extend_from_slice(&value.to_le_bytes());
//! }
//!
//! let frame = SensorFrame::decode(&payload).unwrap();
//! assert_eq!(frame.core_temperature, 36.5);
//! assert_eq!(Sport::default(), Sport::Running);
//! ```

pub mod error;
pub mod thresholds;
pub mod types;
pub mod uuid;

pub use error::{DecodeError, DecodeResult, UnknownSport};
pub use thresholds::{
    ActivityMode, AthleticLevel, CustomBounds, RangeStatus, TemperatureColor, ThresholdRange,
};
pub use types::{
    FRAME_LEN, SensorFrame, SessionInfo, SessionSink, Sport, TemperatureEntry, TemperatureStats,
    round_to,
};
pub use uuid as uuids;
