//! Connection state machine.
//!
//! [`ConnectionMachine`] is a pure transition function: it consumes one
//! [`LinkEvent`] at a time and answers with an [`Outcome`] holding the
//! platform commands to run and the events to publish. It never touches
//! Bluetooth itself, so every transition is testable without hardware.
//!
//! ```text
//! Idle -> Scanning -> Connecting -> ServiceDiscovery -> Subscribing -> Streaming
//!   ^         |            |                |                 |            |
//!   |      timeout         +----------------+---- link lost --+------------+--> Disconnected
//!   +---------+
//! ```
//!
//! `monitoring` and `paused` are flags orthogonal to the state. Frames are
//! only delivered while streaming, monitoring and not paused.
//!
//! # Example
//!
//! ```
//! use innertemp_core::{ConnectionMachine, ConnectionState, LinkCommand, LinkEvent};
//!
//! let mut machine = ConnectionMachine::new();
//! let outcome = machine.handle(LinkEvent::StartScan);
//! assert_eq!(machine.state(), ConnectionState::Scanning);
//! assert!(outcome.commands.contains(&LinkCommand::StartScan));
//!
//! let outcome = machine.handle(LinkEvent::Advertisement {
//!     address: "24:6F:28:AA:BB:CC".into(),
//!     name: Some("ESP32-GATT".into()),
//!     rssi: Some(-52),
//! });
//! assert_eq!(machine.state(), ConnectionState::Connecting);
//! assert!(outcome.commands.contains(&LinkCommand::Connect("24:6F:28:AA:BB:CC".into())));
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use innertemp_types::SensorFrame;
use innertemp_types::uuid::{SENSOR_SERVICE, TEMPERATURE_CHARACTERISTIC, is_sensor_name};

use crate::error::Error;
use crate::events::{CompanionEvent, ConnectionQuality};

/// Default length of one scan window.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(10);

/// Lifecycle of the single sensor link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    ServiceDiscovery,
    Subscribing,
    Streaming,
    /// The link dropped or was released after a failure.
    Disconnected,
}

impl ConnectionState {
    /// Returns `true` while a peripheral link exists or is being set up.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::ServiceDiscovery
                | ConnectionState::Subscribing
                | ConnectionState::Streaming
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Scanning => "scanning",
            ConnectionState::Connecting => "connecting",
            ConnectionState::ServiceDiscovery => "service discovery",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

/// Capability flags of a GATT characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharacteristicProperties {
    /// Whether the fallback subscription accepts this characteristic.
    #[must_use]
    pub fn is_fallback_candidate(&self) -> bool {
        self.read || self.notify
    }
}

/// A characteristic reported by service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
}

/// A service reported by service discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub uuid: Uuid,
    pub characteristics: Vec<DiscoveredCharacteristic>,
}

/// Platform permissions the machine checks before acting.
///
/// An operation that needs a denied permission is a no-op: the state does
/// not change and nothing is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub scan: bool,
    pub connect: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            scan: true,
            connect: true,
        }
    }
}

/// Inputs to the machine: user intents and platform callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// User asked to find a sensor.
    StartScan,
    /// A peripheral advertised while scanning.
    Advertisement {
        address: String,
        name: Option<String>,
        rssi: Option<i16>,
    },
    /// The scan window elapsed.
    ScanTimedOut,
    /// The platform refused to scan.
    ScanFailed(String),
    /// The peripheral accepted the connection.
    LinkEstablished,
    /// Connecting, discovery or subscription failed on the platform side.
    LinkFailed(String),
    /// Service discovery finished.
    ServicesDiscovered(Vec<DiscoveredService>),
    /// The CCCD write for a characteristic succeeded.
    NotificationsEnabled(Uuid),
    /// A characteristic value arrived.
    Notification(Vec<u8>),
    /// The peripheral disconnected.
    LinkLost,
    /// User asked to stop everything.
    Close,
    /// User toggled monitoring.
    ToggleMonitoring,
    /// User toggled pause.
    TogglePause,
    /// A fresh RSSI reading for the current link.
    RssiUpdated(i16),
}

/// Platform work requested by the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    StartScan,
    StopScan,
    /// Deliver [`LinkEvent::ScanTimedOut`] after the given duration.
    ArmScanTimer(Duration),
    CancelScanTimer,
    Connect(String),
    DiscoverServices,
    /// Enable notifications on each listed characteristic.
    Subscribe(Vec<Uuid>),
    /// Disconnect and forget the peripheral.
    ReleaseLink,
    StartRssiPolling,
    StopRssiPolling,
}

/// Result of one transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Commands to execute, in order.
    pub commands: Vec<LinkCommand>,
    /// Events to publish, in order.
    pub events: Vec<CompanionEvent>,
}

impl Outcome {
    fn command(&mut self, command: LinkCommand) {
        self.commands.push(command);
    }

    fn emit(&mut self, event: CompanionEvent) {
        self.events.push(event);
    }

    /// Returns `true` if the transition produced nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.events.is_empty()
    }
}

/// The single active peripheral connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConnection {
    /// Platform address of the peripheral.
    pub address: String,
    /// Characteristics with notifications enabled.
    pub subscribed: Vec<Uuid>,
}

/// The connection state machine. See the [module docs](self).
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    device: Option<DeviceConnection>,
    monitoring: bool,
    paused: bool,
    permissions: Permissions,
    scan_duration: Duration,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    /// Create an idle machine with all permissions granted.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            device: None,
            monitoring: false,
            paused: false,
            permissions: Permissions::default(),
            scan_duration: DEFAULT_SCAN_DURATION,
        }
    }

    /// Set the scan window length.
    #[must_use]
    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Set the initial permissions.
    #[must_use]
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Replace the permissions, e.g. after the user answered a prompt.
    pub fn set_permissions(&mut self, permissions: Permissions) {
        self.permissions = permissions;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn device(&self) -> Option<&DeviceConnection> {
        self.device.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_linked()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn scan_duration(&self) -> Duration {
        self.scan_duration
    }

    /// Apply one event and return the resulting work.
    pub fn handle(&mut self, event: LinkEvent) -> Outcome {
        let mut out = Outcome::default();
        match event {
            LinkEvent::StartScan => self.on_start_scan(&mut out),
            LinkEvent::Advertisement {
                address,
                name,
                rssi,
            } => self.on_advertisement(address, name, rssi, &mut out),
            LinkEvent::ScanTimedOut => {
                if self.state == ConnectionState::Scanning {
                    info!("Scan window elapsed without finding a sensor");
                    out.command(LinkCommand::StopScan);
                    out.emit(CompanionEvent::ScanTimedOut);
                    self.state = ConnectionState::Idle;
                }
            }
            LinkEvent::ScanFailed(reason) => {
                if self.state == ConnectionState::Scanning {
                    warn!(%reason, "Scan failed");
                    out.command(LinkCommand::CancelScanTimer);
                    out.emit(CompanionEvent::ScanFailed { reason });
                    self.state = ConnectionState::Idle;
                }
            }
            LinkEvent::LinkEstablished => {
                if self.state == ConnectionState::Connecting {
                    info!(address = ?self.address(), "Connected, discovering services");
                    self.state = ConnectionState::ServiceDiscovery;
                    out.emit(CompanionEvent::ConnectionStatusChanged { connected: true });
                    out.command(LinkCommand::DiscoverServices);
                    out.command(LinkCommand::StartRssiPolling);
                }
            }
            LinkEvent::LinkFailed(reason) => {
                if self.state.is_linked() {
                    warn!(address = ?self.address(), %reason, "Link setup failed");
                    out.command(LinkCommand::ReleaseLink);
                    out.emit(CompanionEvent::Error { message: reason });
                    self.drop_link(&mut out);
                }
            }
            LinkEvent::ServicesDiscovered(services) => self.on_services(services, &mut out),
            LinkEvent::NotificationsEnabled(uuid) => self.on_notifications_enabled(uuid),
            LinkEvent::Notification(value) => self.on_notification(&value, &mut out),
            LinkEvent::LinkLost => {
                if self.state.is_linked() {
                    info!(address = ?self.address(), "Link lost");
                    self.drop_link(&mut out);
                }
            }
            LinkEvent::Close => self.on_close(&mut out),
            LinkEvent::ToggleMonitoring => {
                self.monitoring = !self.monitoring;
                info!(monitoring = self.monitoring, "Monitoring toggled");
                out.emit(CompanionEvent::MonitoringStatusChanged {
                    monitoring: self.monitoring,
                });
                if !self.monitoring {
                    self.paused = false;
                    out.emit(CompanionEvent::PauseStatusChanged { paused: false });
                }
            }
            LinkEvent::TogglePause => {
                if self.monitoring {
                    self.paused = !self.paused;
                    info!(paused = self.paused, "Pause toggled");
                    out.emit(CompanionEvent::PauseStatusChanged {
                        paused: self.paused,
                    });
                } else {
                    debug!("Pause ignored while not monitoring");
                }
            }
            LinkEvent::RssiUpdated(rssi) => {
                if self.state.is_linked() {
                    out.emit(CompanionEvent::SignalChanged {
                        rssi: Some(rssi),
                        quality: ConnectionQuality::from_rssi(Some(rssi)),
                    });
                }
            }
        }
        out
    }

    fn address(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.address.as_str())
    }

    fn on_start_scan(&mut self, out: &mut Outcome) {
        if !self.permissions.scan {
            warn!("{}", Error::PermissionDenied("scan"));
            return;
        }
        match self.state {
            ConnectionState::Scanning => {
                debug!("Scan already running");
                return;
            }
            state if state.is_linked() => {
                if !self.permissions.connect {
                    warn!("{}", Error::PermissionDenied("connect"));
                    return;
                }
                info!(address = ?self.address(), "Releasing current link before scanning");
                out.command(LinkCommand::ReleaseLink);
                self.drop_link(out);
            }
            _ => {}
        }

        info!(duration = ?self.scan_duration, "Starting scan");
        self.state = ConnectionState::Scanning;
        out.command(LinkCommand::StartScan);
        out.command(LinkCommand::ArmScanTimer(self.scan_duration));
    }

    fn on_advertisement(
        &mut self,
        address: String,
        name: Option<String>,
        rssi: Option<i16>,
        out: &mut Outcome,
    ) {
        if self.state != ConnectionState::Scanning {
            return;
        }
        let Some(name) = name.filter(|n| is_sensor_name(n)) else {
            return;
        };
        if !self.permissions.connect {
            warn!("{}", Error::PermissionDenied("connect"));
            return;
        }

        info!(%address, %name, ?rssi, "Sensor found, connecting");
        out.command(LinkCommand::CancelScanTimer);
        out.command(LinkCommand::StopScan);
        out.command(LinkCommand::Connect(address.clone()));
        out.emit(CompanionEvent::DeviceFound {
            address: address.clone(),
            name,
            rssi,
        });
        self.device = Some(DeviceConnection {
            address,
            subscribed: Vec::new(),
        });
        self.state = ConnectionState::Connecting;
    }

    fn on_services(&mut self, services: Vec<DiscoveredService>, out: &mut Outcome) {
        if self.state != ConnectionState::ServiceDiscovery {
            return;
        }
        if !self.permissions.connect {
            warn!("{}", Error::PermissionDenied("connect"));
            return;
        }

        let expected = services
            .iter()
            .filter(|s| s.uuid == SENSOR_SERVICE)
            .flat_map(|s| &s.characteristics)
            .any(|c| c.uuid == TEMPERATURE_CHARACTERISTIC);

        let targets: Vec<Uuid> = if expected {
            vec![TEMPERATURE_CHARACTERISTIC]
        } else {
            warn!(
                service_count = services.len(),
                "Sensor service not found, subscribing to every readable or notifying characteristic"
            );
            let mut uuids = Vec::new();
            for characteristic in services.iter().flat_map(|s| &s.characteristics) {
                if characteristic.properties.is_fallback_candidate()
                    && !uuids.contains(&characteristic.uuid)
                {
                    uuids.push(characteristic.uuid);
                }
            }
            uuids
        };

        if targets.is_empty() {
            let err = Error::NoUsableCharacteristic {
                service_count: services.len(),
            };
            warn!("{err}");
            out.command(LinkCommand::ReleaseLink);
            out.emit(CompanionEvent::Error {
                message: err.to_string(),
            });
            self.drop_link(out);
            return;
        }

        debug!(?targets, "Subscribing");
        out.command(LinkCommand::Subscribe(targets));
        self.state = ConnectionState::Subscribing;
    }

    fn on_notifications_enabled(&mut self, uuid: Uuid) {
        if !matches!(
            self.state,
            ConnectionState::Subscribing | ConnectionState::Streaming
        ) {
            return;
        }
        if let Some(device) = self.device.as_mut()
            && !device.subscribed.contains(&uuid)
        {
            device.subscribed.push(uuid);
        }
        if self.state == ConnectionState::Subscribing {
            info!(%uuid, "Notifications enabled, streaming");
            self.state = ConnectionState::Streaming;
        }
    }

    fn on_notification(&mut self, value: &[u8], out: &mut Outcome) {
        if self.state != ConnectionState::Streaming || !self.monitoring {
            return;
        }
        let frame = match SensorFrame::decode(value).and_then(|f| f.ensure_finite().map(|()| f)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(len = value.len(), error = %e, "Dropping undecodable notification");
                return;
            }
        };
        if self.paused {
            return;
        }
        out.emit(CompanionEvent::DataReceived { frame });
    }

    fn on_close(&mut self, out: &mut Outcome) {
        if self.state == ConnectionState::Scanning && !self.permissions.scan {
            warn!("{}", Error::PermissionDenied("scan"));
            return;
        }
        if self.state.is_linked() && !self.permissions.connect {
            warn!("{}", Error::PermissionDenied("connect"));
            return;
        }

        let was_linked = self.state.is_linked();
        match self.state {
            ConnectionState::Scanning => {
                out.command(LinkCommand::CancelScanTimer);
                out.command(LinkCommand::StopScan);
            }
            _ if was_linked => {
                out.command(LinkCommand::StopRssiPolling);
                out.command(LinkCommand::ReleaseLink);
            }
            // The backend may still hold the lost peripheral.
            ConnectionState::Disconnected => out.command(LinkCommand::ReleaseLink),
            _ => {}
        }

        if was_linked {
            out.emit(CompanionEvent::ConnectionStatusChanged { connected: false });
        }
        if self.monitoring {
            out.emit(CompanionEvent::MonitoringStatusChanged { monitoring: false });
        }
        if self.paused {
            out.emit(CompanionEvent::PauseStatusChanged { paused: false });
        }

        debug!(from = %self.state, "Closed");
        self.monitoring = false;
        self.paused = false;
        self.device = None;
        self.state = ConnectionState::Idle;
    }

    /// Common teardown after the link is gone or released.
    fn drop_link(&mut self, out: &mut Outcome) {
        out.command(LinkCommand::StopRssiPolling);
        out.emit(CompanionEvent::ConnectionStatusChanged { connected: false });
        out.emit(CompanionEvent::MonitoringStatusChanged { monitoring: false });
        out.emit(CompanionEvent::PauseStatusChanged { paused: false });
        out.emit(CompanionEvent::SignalChanged {
            rssi: None,
            quality: ConnectionQuality::Disconnected,
        });
        self.monitoring = false;
        self.paused = false;
        self.device = None;
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDRESS: &str = "24:6F:28:AA:BB:CC";

    fn advert(name: &str) -> LinkEvent {
        LinkEvent::Advertisement {
            address: ADDRESS.to_string(),
            name: Some(name.to_string()),
            rssi: Some(-55),
        }
    }

    fn sensor_services() -> Vec<DiscoveredService> {
        vec![DiscoveredService {
            uuid: SENSOR_SERVICE,
            characteristics: vec![DiscoveredCharacteristic {
                uuid: TEMPERATURE_CHARACTERISTIC,
                properties: CharacteristicProperties {
                    read: true,
                    notify: true,
                    ..Default::default()
                },
            }],
        }]
    }

    fn payload(skin: f32, outside: f32, battery: f32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&skin.to_le_bytes());
        bytes.extend_from_slice(&outside.to_le_bytes());
        bytes.extend_from_slice(&battery.to_le_bytes());
        bytes
    }

    fn streaming_machine() -> ConnectionMachine {
        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::StartScan);
        machine.handle(advert("ESP32"));
        machine.handle(LinkEvent::LinkEstablished);
        machine.handle(LinkEvent::ServicesDiscovered(sensor_services()));
        machine.handle(LinkEvent::NotificationsEnabled(TEMPERATURE_CHARACTERISTIC));
        assert_eq!(machine.state(), ConnectionState::Streaming);
        machine
    }

    fn data_frames(outcome: &Outcome) -> Vec<SensorFrame> {
        outcome
            .events
            .iter()
            .filter_map(|e| match e {
                CompanionEvent::DataReceived { frame } => Some(*frame),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_scan_arms_timer() {
        let mut machine = ConnectionMachine::new().with_scan_duration(Duration::from_secs(3));
        let out = machine.handle(LinkEvent::StartScan);

        assert_eq!(machine.state(), ConnectionState::Scanning);
        assert_eq!(
            out.commands,
            vec![
                LinkCommand::StartScan,
                LinkCommand::ArmScanTimer(Duration::from_secs(3))
            ]
        );
    }

    #[test]
    fn test_non_matching_advertisement_ignored() {
        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::StartScan);

        assert!(machine.handle(advert("Heart Rate")).is_empty());
        assert!(machine.handle(advert("esp32")).is_empty());
        let unnamed = LinkEvent::Advertisement {
            address: ADDRESS.to_string(),
            name: None,
            rssi: None,
        };
        assert!(machine.handle(unnamed).is_empty());
        assert_eq!(machine.state(), ConnectionState::Scanning);
    }

    #[test]
    fn test_matching_advertisement_connects() {
        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::StartScan);
        let out = machine.handle(advert("MyGATTServer"));

        assert_eq!(machine.state(), ConnectionState::Connecting);
        assert_eq!(
            out.commands,
            vec![
                LinkCommand::CancelScanTimer,
                LinkCommand::StopScan,
                LinkCommand::Connect(ADDRESS.to_string())
            ]
        );
        assert_eq!(machine.device().unwrap().address, ADDRESS);
    }

    #[test]
    fn test_scan_timeout_returns_to_idle() {
        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::StartScan);
        let out = machine.handle(LinkEvent::ScanTimedOut);

        assert_eq!(machine.state(), ConnectionState::Idle);
        assert_eq!(out.commands, vec![LinkCommand::StopScan]);
        assert_eq!(out.events, vec![CompanionEvent::ScanTimedOut]);
    }

    #[test]
    fn test_stale_scan_timeout_ignored() {
        let mut machine = streaming_machine();
        assert!(machine.handle(LinkEvent::ScanTimedOut).is_empty());
        assert_eq!(machine.state(), ConnectionState::Streaming);
    }

    #[test]
    fn test_scan_failure_reported_once() {
        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::StartScan);
        let out = machine.handle(LinkEvent::ScanFailed("adapter off".into()));

        assert_eq!(machine.state(), ConnectionState::Idle);
        assert_eq!(
            out.events,
            vec![CompanionEvent::ScanFailed {
                reason: "adapter off".into()
            }]
        );
        assert!(!out.commands.contains(&LinkCommand::StartScan));
        assert!(machine.handle(LinkEvent::ScanFailed("again".into())).is_empty());
    }

    #[test]
    fn test_link_established_discovers() {
        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::StartScan);
        machine.handle(advert("ESP32"));
        let out = machine.handle(LinkEvent::LinkEstablished);

        assert_eq!(machine.state(), ConnectionState::ServiceDiscovery);
        assert!(machine.is_connected());
        assert_eq!(
            out.events,
            vec![CompanionEvent::ConnectionStatusChanged { connected: true }]
        );
        assert!(out.commands.contains(&LinkCommand::DiscoverServices));
    }

    #[test]
    fn test_expected_characteristic_subscribed() {
        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::StartScan);
        machine.handle(advert("ESP32"));
        machine.handle(LinkEvent::LinkEstablished);
        let out = machine.handle(LinkEvent::ServicesDiscovered(sensor_services()));

        assert_eq!(machine.state(), ConnectionState::Subscribing);
        assert_eq!(
            out.commands,
            vec![LinkCommand::Subscribe(vec![TEMPERATURE_CHARACTERISTIC])]
        );
    }

    #[test]
    fn test_fallback_subscribes_readable_and_notifying() {
        let read_only = Uuid::from_u128(1);
        let notify_only = Uuid::from_u128(2);
        let write_only = Uuid::from_u128(3);
        let services = vec![DiscoveredService {
            uuid: Uuid::from_u128(0xAA),
            characteristics: vec![
                DiscoveredCharacteristic {
                    uuid: read_only,
                    properties: CharacteristicProperties {
                        read: true,
                        ..Default::default()
                    },
                },
                DiscoveredCharacteristic {
                    uuid: notify_only,
                    properties: CharacteristicProperties {
                        notify: true,
                        ..Default::default()
                    },
                },
                DiscoveredCharacteristic {
                    uuid: write_only,
                    properties: CharacteristicProperties {
                        write: true,
                        ..Default::default()
                    },
                },
            ],
        }];

        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::StartScan);
        machine.handle(advert("ESP32"));
        machine.handle(LinkEvent::LinkEstablished);
        let out = machine.handle(LinkEvent::ServicesDiscovered(services));

        assert_eq!(machine.state(), ConnectionState::Subscribing);
        assert_eq!(
            out.commands,
            vec![LinkCommand::Subscribe(vec![read_only, notify_only])]
        );
    }

    #[test]
    fn test_no_usable_characteristic_releases_link() {
        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::StartScan);
        machine.handle(advert("ESP32"));
        machine.handle(LinkEvent::LinkEstablished);
        let out = machine.handle(LinkEvent::ServicesDiscovered(Vec::new()));

        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert!(out.commands.contains(&LinkCommand::ReleaseLink));
        assert!(out.events.iter().any(|e| matches!(
            e,
            CompanionEvent::Error { message } if message.contains("No usable characteristic")
        )));
    }

    #[test]
    fn test_notification_dropped_unless_monitoring() {
        let mut machine = streaming_machine();
        let out = machine.handle(LinkEvent::Notification(payload(33.0, 3.5, 80.0)));
        assert!(data_frames(&out).is_empty());

        machine.handle(LinkEvent::ToggleMonitoring);
        let out = machine.handle(LinkEvent::Notification(payload(33.0, 3.5, 80.0)));
        let frames = data_frames(&out);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].core_temperature, 36.5);
    }

    #[test]
    fn test_paused_suppresses_delivery() {
        let mut machine = streaming_machine();
        machine.handle(LinkEvent::ToggleMonitoring);
        machine.handle(LinkEvent::TogglePause);
        assert!(machine.is_paused());

        let out = machine.handle(LinkEvent::Notification(payload(33.0, 3.5, 80.0)));
        assert!(data_frames(&out).is_empty());

        machine.handle(LinkEvent::TogglePause);
        let out = machine.handle(LinkEvent::Notification(payload(33.0, 3.5, 80.0)));
        assert_eq!(data_frames(&out).len(), 1);
    }

    #[test]
    fn test_bad_payloads_dropped() {
        let mut machine = streaming_machine();
        machine.handle(LinkEvent::ToggleMonitoring);

        assert!(machine.handle(LinkEvent::Notification(vec![1, 2, 3])).is_empty());
        assert!(
            machine
                .handle(LinkEvent::Notification(payload(f32::NAN, 1.0, 1.0)))
                .is_empty()
        );
        assert_eq!(machine.state(), ConnectionState::Streaming);
    }

    #[test]
    fn test_scenario_decoded_frame() {
        let mut machine = streaming_machine();
        machine.handle(LinkEvent::ToggleMonitoring);

        let out = machine.handle(LinkEvent::Notification(payload(22.335, 14.115, 87.5)));
        let frame = data_frames(&out)[0];
        assert!((frame.core_temperature - 36.45).abs() <= 0.011);
        assert_eq!(frame.battery_level, 87.5);
    }

    #[test]
    fn test_link_lost_clears_flags() {
        let mut machine = streaming_machine();
        machine.handle(LinkEvent::ToggleMonitoring);
        machine.handle(LinkEvent::TogglePause);

        let out = machine.handle(LinkEvent::LinkLost);

        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert!(!machine.is_monitoring());
        assert!(!machine.is_paused());
        assert!(machine.device().is_none());
        for expected in [
            CompanionEvent::ConnectionStatusChanged { connected: false },
            CompanionEvent::MonitoringStatusChanged { monitoring: false },
            CompanionEvent::PauseStatusChanged { paused: false },
        ] {
            assert!(out.events.contains(&expected), "missing {expected:?}");
        }
    }

    #[test]
    fn test_link_lost_ignored_when_not_linked() {
        let mut machine = ConnectionMachine::new();
        assert!(machine.handle(LinkEvent::LinkLost).is_empty());
        assert_eq!(machine.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_link_failed_during_connect() {
        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::StartScan);
        machine.handle(advert("ESP32"));
        let out = machine.handle(LinkEvent::LinkFailed("refused".into()));

        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert!(out.commands.contains(&LinkCommand::ReleaseLink));
        assert!(out.events.contains(&CompanionEvent::Error {
            message: "refused".into()
        }));
    }

    #[test]
    fn test_close_while_streaming() {
        let mut machine = streaming_machine();
        machine.handle(LinkEvent::ToggleMonitoring);

        let out = machine.handle(LinkEvent::Close);

        assert_eq!(machine.state(), ConnectionState::Idle);
        assert_eq!(
            out.commands,
            vec![LinkCommand::StopRssiPolling, LinkCommand::ReleaseLink]
        );
        assert_eq!(
            out.events,
            vec![
                CompanionEvent::ConnectionStatusChanged { connected: false },
                CompanionEvent::MonitoringStatusChanged { monitoring: false },
            ]
        );
    }

    #[test]
    fn test_close_while_scanning() {
        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::StartScan);
        let out = machine.handle(LinkEvent::Close);

        assert_eq!(machine.state(), ConnectionState::Idle);
        assert_eq!(
            out.commands,
            vec![LinkCommand::CancelScanTimer, LinkCommand::StopScan]
        );
        assert!(out.events.is_empty());
    }

    #[test]
    fn test_close_after_link_lost_releases() {
        let mut machine = streaming_machine();
        machine.handle(LinkEvent::LinkLost);

        let out = machine.handle(LinkEvent::Close);

        assert_eq!(machine.state(), ConnectionState::Idle);
        assert_eq!(out.commands, vec![LinkCommand::ReleaseLink]);
        assert!(out.events.is_empty());
    }

    #[test]
    fn test_close_when_idle_is_quiet() {
        let mut machine = ConnectionMachine::new();
        assert!(machine.handle(LinkEvent::Close).is_empty());
    }

    #[test]
    fn test_toggle_monitoring_off_clears_pause() {
        let mut machine = ConnectionMachine::new();
        machine.handle(LinkEvent::ToggleMonitoring);
        machine.handle(LinkEvent::TogglePause);

        let out = machine.handle(LinkEvent::ToggleMonitoring);

        assert!(!machine.is_monitoring());
        assert!(!machine.is_paused());
        assert_eq!(
            out.events,
            vec![
                CompanionEvent::MonitoringStatusChanged { monitoring: false },
                CompanionEvent::PauseStatusChanged { paused: false },
            ]
        );
    }

    #[test]
    fn test_pause_requires_monitoring() {
        let mut machine = ConnectionMachine::new();
        assert!(machine.handle(LinkEvent::TogglePause).is_empty());
        assert!(!machine.is_paused());
    }

    #[test]
    fn test_scan_denied_is_noop() {
        let mut machine = ConnectionMachine::new().with_permissions(Permissions {
            scan: false,
            connect: true,
        });
        assert!(machine.handle(LinkEvent::StartScan).is_empty());
        assert_eq!(machine.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_connect_denied_is_noop() {
        let mut machine = ConnectionMachine::new().with_permissions(Permissions {
            scan: true,
            connect: false,
        });
        machine.handle(LinkEvent::StartScan);
        assert!(machine.handle(advert("ESP32")).is_empty());
        assert_eq!(machine.state(), ConnectionState::Scanning);

        machine.set_permissions(Permissions::default());
        machine.handle(advert("ESP32"));
        assert_eq!(machine.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_rescan_releases_prior_link() {
        let mut machine = streaming_machine();
        let out = machine.handle(LinkEvent::StartScan);

        assert_eq!(machine.state(), ConnectionState::Scanning);
        assert_eq!(out.commands[0], LinkCommand::ReleaseLink);
        assert!(out.commands.contains(&LinkCommand::StartScan));
        assert!(
            out.events
                .contains(&CompanionEvent::ConnectionStatusChanged { connected: false })
        );
    }

    #[test]
    fn test_rssi_only_while_linked() {
        let mut machine = ConnectionMachine::new();
        assert!(machine.handle(LinkEvent::RssiUpdated(-50)).is_empty());

        let mut machine = streaming_machine();
        let out = machine.handle(LinkEvent::RssiUpdated(-70));
        assert_eq!(
            out.events,
            vec![CompanionEvent::SignalChanged {
                rssi: Some(-70),
                quality: ConnectionQuality::Medium
            }]
        );
    }

    #[test]
    fn test_additional_enables_recorded() {
        let mut machine = streaming_machine();
        let other = Uuid::from_u128(7);
        machine.handle(LinkEvent::NotificationsEnabled(other));
        machine.handle(LinkEvent::NotificationsEnabled(other));

        assert_eq!(
            machine.device().unwrap().subscribed,
            vec![TEMPERATURE_CHARACTERISTIC, other]
        );
    }
}
