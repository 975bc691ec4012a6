//! Core BLE library for the InnerTemp wearable temperature sensor.
//!
//! The sensor is an ESP32 that notifies a 12-byte frame (skin temperature,
//! outside temperature, battery level) on a custom GATT characteristic. This
//! crate finds it, keeps the link, decodes the frames and hands them to the
//! session store, a running average and a mirror gateway.
//!
//! # Features
//!
//! - **Connection state machine**: pure, hardware-free transitions from scan
//!   to streaming, with monitoring and pause flags
//! - **Fallback subscription**: tolerates firmware with a different GATT layout
//! - **btleplug backend**: Linux, macOS and Windows through one trait
//! - **Mock backend**: scripted scenarios for tests
//! - **Running average**: last 100 valid core temperatures
//! - **Alerts and mirroring**: rate-limited temperature and battery alerts
//!
//! # Platform Differences
//!
//! - **macOS**: peripherals are identified by a CoreBluetooth UUID, stable per
//!   Mac but not equal to the MAC address.
//! - **Linux/Windows**: peripherals are identified by their MAC address.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use innertemp_core::{BtleplugBackend, CompanionEvent, Driver, DriverConfig, link_channel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, rx) = link_channel();
//!     let backend = Arc::new(BtleplugBackend::new(tx.clone()).await?);
//!     let (driver, handle) = Driver::new(backend, tx, rx, DriverConfig::default());
//!     let mut events = handle.subscribe();
//!     driver.spawn();
//!
//!     handle.start_scan().await?;
//!     handle.toggle_monitoring().await?;
//!     while let Ok(event) = events.recv().await {
//!         if let CompanionEvent::DataReceived { frame } = event {
//!             println!("core {:.2} °C", frame.core_temperature);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod backend;
pub mod btle;
pub mod driver;
pub mod error;
pub mod events;
pub mod gateway;
pub mod machine;
pub mod mock;
pub mod pipeline;

// Re-export types from innertemp-types
pub use innertemp_types::types;
pub use innertemp_types::uuid;

pub use aggregator::{RunningAverage, WINDOW_SIZE};
pub use backend::{BleBackend, LinkReceiver, LinkSender, link_channel};
pub use btle::{BtleplugBackend, get_adapter};
pub use driver::{Driver, DriverConfig, DriverHandle};
pub use error::{Error, Result};
pub use events::{CompanionEvent, ConnectionQuality, EventDispatcher, EventReceiver, EventSender};
pub use gateway::{Alert, AlertPolicy, LinkFlags, MirrorGateway, MirrorRecord, TracingGateway};
pub use machine::{
    CharacteristicProperties, ConnectionMachine, ConnectionState, DeviceConnection,
    DiscoveredCharacteristic, DiscoveredService, LinkCommand, LinkEvent, Outcome, Permissions,
};
pub use mock::{MockBackend, MockBackendBuilder, MockCall};
pub use pipeline::Pipeline;

pub use innertemp_types::uuid as uuids;
pub use innertemp_types::{SensorFrame, SessionSink, Sport, TemperatureColor, ThresholdRange};
