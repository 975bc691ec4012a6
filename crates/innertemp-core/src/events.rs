//! Companion event system.
//!
//! The connection machine reports everything collaborators care about as a
//! [`CompanionEvent`]. The driver fans them out over a broadcast channel so
//! the pipeline, the CLI and tests can each hold a receiver.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use innertemp_types::SensorFrame;

/// Link quality derived from RSSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionQuality {
    /// RSSI above -60 dBm.
    Good,
    /// RSSI above -80 dBm.
    Medium,
    /// RSSI at or below -80 dBm.
    Bad,
    /// No link, or no RSSI reading.
    Disconnected,
}

impl ConnectionQuality {
    /// Classify an RSSI reading in dBm.
    ///
    /// ```
    /// use innertemp_core::ConnectionQuality;
    ///
    /// assert_eq!(ConnectionQuality::from_rssi(Some(-45)), ConnectionQuality::Good);
    /// assert_eq!(ConnectionQuality::from_rssi(Some(-60)), ConnectionQuality::Medium);
    /// assert_eq!(ConnectionQuality::from_rssi(Some(-80)), ConnectionQuality::Bad);
    /// assert_eq!(ConnectionQuality::from_rssi(None), ConnectionQuality::Disconnected);
    /// ```
    #[must_use]
    pub fn from_rssi(rssi: Option<i16>) -> Self {
        match rssi {
            Some(dbm) if dbm > -60 => ConnectionQuality::Good,
            Some(dbm) if dbm > -80 => ConnectionQuality::Medium,
            Some(_) => ConnectionQuality::Bad,
            None => ConnectionQuality::Disconnected,
        }
    }
}

/// Events emitted by the connection machine.
///
/// All events are serializable for logging and mirroring.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum CompanionEvent {
    /// A sensor advertisement matched during scanning.
    DeviceFound {
        address: String,
        name: String,
        rssi: Option<i16>,
    },
    /// The scan window elapsed without a match.
    ScanTimedOut,
    /// The platform refused the scan. Not retried.
    ScanFailed { reason: String },
    /// Link to the sensor came up or went down.
    ConnectionStatusChanged { connected: bool },
    /// Monitoring was switched on or off.
    MonitoringStatusChanged { monitoring: bool },
    /// Pause was switched on or off.
    PauseStatusChanged { paused: bool },
    /// A frame was accepted while monitoring and not paused.
    DataReceived { frame: SensorFrame },
    /// Signal strength changed.
    SignalChanged {
        rssi: Option<i16>,
        quality: ConnectionQuality,
    },
    /// A recoverable error occurred.
    Error { message: String },
}

impl CompanionEvent {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            CompanionEvent::DeviceFound { .. } => "device_found",
            CompanionEvent::ScanTimedOut => "scan_timed_out",
            CompanionEvent::ScanFailed { .. } => "scan_failed",
            CompanionEvent::ConnectionStatusChanged { .. } => "connection_status_changed",
            CompanionEvent::MonitoringStatusChanged { .. } => "monitoring_status_changed",
            CompanionEvent::PauseStatusChanged { .. } => "pause_status_changed",
            CompanionEvent::DataReceived { .. } => "data_received",
            CompanionEvent::SignalChanged { .. } => "signal_changed",
            CompanionEvent::Error { .. } => "error",
        }
    }
}

/// Sender for companion events.
pub type EventSender = broadcast::Sender<CompanionEvent>;

/// Receiver for companion events.
pub type EventReceiver = broadcast::Receiver<CompanionEvent>;

/// Default broadcast capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: CompanionEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
