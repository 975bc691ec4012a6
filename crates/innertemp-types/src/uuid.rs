//! Bluetooth identifiers for the InnerTemp sensor.
//!
//! The peripheral is an ESP32 running a single custom GATT service that
//! exposes one notifying characteristic carrying the 12-byte frame.

use uuid::{Uuid, uuid};

/// Custom service exposed by the sensor firmware.
pub const SENSOR_SERVICE: Uuid = uuid!("4fafc201-1fb5-459e-8fcc-c5c9c331914b");

/// Characteristic that notifies temperature frames.
pub const TEMPERATURE_CHARACTERISTIC: Uuid = uuid!("beb5483e-36e1-4688-b7f5-ea07361b26a8");

/// Client Characteristic Configuration descriptor (enables notifications).
///
/// btleplug writes this descriptor itself when subscribing; the constant
/// documents the layout and serves backends that write it by hand.
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = uuid!("00002902-0000-1000-8000-00805f9b34fb");

/// Advertised-name fragments that identify a sensor during scanning.
///
/// Matching is a case-sensitive substring test.
pub const DEVICE_NAME_FRAGMENTS: [&str; 2] = ["ESP", "GATT"];

/// Returns `true` if an advertised name belongs to a sensor.
///
/// # Examples
///
/// ```
/// use innertemp_types::uuid::is_sensor_name;
///
/// assert!(is_sensor_name("ESP-GATT"));
/// assert!(is_sensor_name("MyESP32"));
/// assert!(!is_sensor_name("esp32"));
/// ```
#[must_use]
pub fn is_sensor_name(name: &str) -> bool {
    DEVICE_NAME_FRAGMENTS
        .iter()
        .any(|fragment| name.contains(fragment))
}
