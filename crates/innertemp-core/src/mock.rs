//! Mock backend for testing.
//!
//! [`MockBackend`] implements [`BleBackend`] without any Bluetooth stack. It
//! records every call, replays scripted advertisements when a scan starts
//! and lets tests inject notifications or a link loss at any point.
//!
//! # Features
//!
//! - **Failure injection**: make scanning or connecting fail
//! - **Custom GATT layout**: exercise the fallback subscription path
//! - **Call log**: assert on the exact command sequence

use std::sync::atomic::{AtomicBool, AtomicI16, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use innertemp_types::uuid::{SENSOR_SERVICE, TEMPERATURE_CHARACTERISTIC};

use crate::backend::{BleBackend, LinkSender};
use crate::error::{Error, Result};
use crate::machine::{
    CharacteristicProperties, DiscoveredCharacteristic, DiscoveredService, LinkEvent,
};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    StartScan,
    StopScan,
    Connect(String),
    DiscoverServices,
    Subscribe(Vec<Uuid>),
    Release,
}

/// A scripted Bluetooth backend.
///
/// # Example
///
/// ```
/// use innertemp_core::{BleBackend, MockBackend, MockCall, link_channel};
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = link_channel();
///     let backend = MockBackend::new(tx);
///
///     backend.start_scan().await.unwrap();
///     assert!(rx.recv().await.is_some());
///     assert_eq!(backend.calls().await, vec![MockCall::StartScan]);
/// }
/// ```
pub struct MockBackend {
    link_tx: LinkSender,
    name: String,
    address: String,
    advertise: bool,
    services: RwLock<Vec<DiscoveredService>>,
    calls: RwLock<Vec<MockCall>>,
    linked: AtomicBool,
    rssi: AtomicI16,
    fail_scan: AtomicBool,
    fail_connect: AtomicBool,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("linked", &self.linked.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockBackend {
    /// Create a backend that advertises one sensor with the standard layout.
    pub fn new(link_tx: LinkSender) -> Self {
        MockBackendBuilder::new().build(link_tx)
    }

    /// GATT layout of real sensor firmware.
    pub fn sensor_services() -> Vec<DiscoveredService> {
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

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_linked(&self) -> bool {
        self.linked.load(Ordering::SeqCst)
    }

    /// Snapshot of the calls made so far.
    pub async fn calls(&self) -> Vec<MockCall> {
        self.calls.read().await.clone()
    }

    pub async fn was_called(&self, call: &MockCall) -> bool {
        self.calls.read().await.contains(call)
    }

    pub fn set_rssi(&self, rssi: i16) {
        self.rssi.store(rssi, Ordering::SeqCst);
    }

    pub fn set_fail_scan(&self, fail: bool) {
        self.fail_scan.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub async fn set_services(&self, services: Vec<DiscoveredService>) {
        *self.services.write().await = services;
    }

    /// Deliver a raw notification value.
    pub async fn notify(&self, value: Vec<u8>) -> Result<()> {
        self.link_tx.send(LinkEvent::Notification(value)).await?;
        Ok(())
    }

    /// Deliver a frame built from the three sensor floats.
    pub async fn notify_frame(&self, skin: f32, outside: f32, battery: f32) -> Result<()> {
        let mut value = Vec::with_capacity(12);
        value.extend_from_slice(&skin.to_le_bytes());
        value.extend_from_slice(&outside.to_le_bytes());
        value.extend_from_slice(&battery.to_le_bytes());
        self.notify(value).await
    }

    /// Simulate the sensor going out of range.
    pub async fn drop_link(&self) -> Result<()> {
        self.linked.store(false, Ordering::SeqCst);
        self.link_tx.send(LinkEvent::LinkLost).await?;
        Ok(())
    }

    async fn record(&self, call: MockCall) {
        self.calls.write().await.push(call);
    }
}

#[async_trait]
impl BleBackend for MockBackend {
    async fn start_scan(&self) -> Result<()> {
        self.record(MockCall::StartScan).await;
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(Error::ScanFailed("mock scan failure".to_string()));
        }
        if self.advertise {
            self.link_tx
                .send(LinkEvent::Advertisement {
                    address: self.address.clone(),
                    name: Some(self.name.clone()),
                    rssi: Some(self.rssi.load(Ordering::SeqCst)),
                })
                .await?;
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record(MockCall::StopScan).await;
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<()> {
        self.record(MockCall::Connect(address.to_string())).await;
        if self.fail_connect.load(Ordering::SeqCst) || address != self.address {
            return Err(Error::device_not_found(address));
        }
        self.linked.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<DiscoveredService>> {
        self.record(MockCall::DiscoverServices).await;
        if !self.is_linked() {
            return Err(Error::NotConnected);
        }
        Ok(self.services.read().await.clone())
    }

    async fn subscribe(&self, characteristics: &[Uuid]) -> Result<Vec<Uuid>> {
        self.record(MockCall::Subscribe(characteristics.to_vec())).await;
        if !self.is_linked() {
            return Err(Error::NotConnected);
        }
        let services = self.services.read().await;
        Ok(characteristics
            .iter()
            .copied()
            .filter(|uuid| {
                services
                    .iter()
                    .flat_map(|s| &s.characteristics)
                    .any(|c| c.uuid == *uuid)
            })
            .collect())
    }

    async fn release(&self) -> Result<()> {
        self.record(MockCall::Release).await;
        self.linked.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn read_rssi(&self) -> Result<Option<i16>> {
        Ok(self
            .is_linked()
            .then(|| self.rssi.load(Ordering::SeqCst)))
    }
}

/// Builder for [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockBackendBuilder {
    name: String,
    address: Option<String>,
    advertise: bool,
    services: Vec<DiscoveredService>,
    rssi: i16,
    fail_scan: bool,
    fail_connect: bool,
}

impl Default for MockBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackendBuilder {
    pub fn new() -> Self {
        Self {
            name: "ESP32-GATT".to_string(),
            address: None,
            advertise: true,
            services: MockBackend::sensor_services(),
            rssi: -55,
            fail_scan: false,
            fail_connect: false,
        }
    }

    /// Advertised local name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    /// Whether starting a scan replays the advertisement.
    pub fn advertise(mut self, advertise: bool) -> Self {
        self.advertise = advertise;
        self
    }

    pub fn services(mut self, services: Vec<DiscoveredService>) -> Self {
        self.services = services;
        self
    }

    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = rssi;
        self
    }

    pub fn fail_scan(mut self, fail: bool) -> Self {
        self.fail_scan = fail;
        self
    }

    pub fn fail_connect(mut self, fail: bool) -> Self {
        self.fail_connect = fail;
        self
    }

    pub fn build(self, link_tx: LinkSender) -> MockBackend {
        MockBackend {
            link_tx,
            name: self.name,
            address: self
                .address
                .unwrap_or_else(|| format!("MOCK-{:06X}", rand::random::<u32>() % 0xFFFFFF)),
            advertise: self.advertise,
            services: RwLock::new(self.services),
            calls: RwLock::new(Vec::new()),
            linked: AtomicBool::new(false),
            rssi: AtomicI16::new(self.rssi),
            fail_scan: AtomicBool::new(self.fail_scan),
            fail_connect: AtomicBool::new(self.fail_connect),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::link_channel;

    #[tokio::test]
    async fn test_scan_replays_advertisement() {
        let (tx, mut rx) = link_channel();
        let backend = MockBackendBuilder::new()
            .name("GATT-Sensor")
            .address("AA:BB")
            .rssi(-70)
            .build(tx);

        backend.start_scan().await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            LinkEvent::Advertisement {
                address: "AA:BB".into(),
                name: Some("GATT-Sensor".into()),
                rssi: Some(-70),
            }
        );
    }

    #[tokio::test]
    async fn test_scan_failure() {
        let (tx, _rx) = link_channel();
        let backend = MockBackendBuilder::new().fail_scan(true).build(tx);
        assert!(matches!(
            backend.start_scan().await,
            Err(Error::ScanFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_and_discover() {
        let (tx, _rx) = link_channel();
        let backend = MockBackend::new(tx);
        let address = backend.address().to_string();

        assert!(backend.discover_services().await.is_err());
        backend.connect(&address).await.unwrap();
        assert!(backend.is_linked());

        let services = backend.discover_services().await.unwrap();
        assert_eq!(services, MockBackend::sensor_services());
        assert_eq!(backend.read_rssi().await.unwrap(), Some(-55));
    }

    #[tokio::test]
    async fn test_connect_wrong_address_fails() {
        let (tx, _rx) = link_channel();
        let backend = MockBackendBuilder::new().address("AA").build(tx);
        assert!(backend.connect("BB").await.is_err());
        assert!(!backend.is_linked());
    }

    #[tokio::test]
    async fn test_subscribe_filters_unknown() {
        let (tx, _rx) = link_channel();
        let backend = MockBackendBuilder::new().address("AA").build(tx);
        backend.connect("AA").await.unwrap();

        let enabled = backend
            .subscribe(&[TEMPERATURE_CHARACTERISTIC, Uuid::from_u128(9)])
            .await
            .unwrap();
        assert_eq!(enabled, vec![TEMPERATURE_CHARACTERISTIC]);
    }

    #[tokio::test]
    async fn test_release_and_drop_link() {
        let (tx, mut rx) = link_channel();
        let backend = MockBackendBuilder::new().address("AA").build(tx);
        backend.connect("AA").await.unwrap();

        backend.drop_link().await.unwrap();
        assert!(!backend.is_linked());
        assert_eq!(rx.recv().await.unwrap(), LinkEvent::LinkLost);
        assert_eq!(backend.read_rssi().await.unwrap(), None);

        backend.release().await.unwrap();
        assert!(backend.was_called(&MockCall::Release).await);
    }

    #[tokio::test]
    async fn test_notify_frame_encodes_floats() {
        let (tx, mut rx) = link_channel();
        let backend = MockBackend::new(tx);
        backend.notify_frame(33.0, 3.5, 80.0).await.unwrap();

        match rx.recv().await.unwrap() {
            LinkEvent::Notification(value) => assert_eq!(value.len(), 12),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_default_address_format() {
        let (tx, _rx) = link_channel();
        let backend = MockBackend::new(tx);
        assert!(backend.address().starts_with("MOCK-"));
    }
}
