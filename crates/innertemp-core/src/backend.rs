//! Platform seam for Bluetooth operations.
//!
//! A [`BleBackend`] performs the commands the connection machine asks for.
//! Unsolicited platform callbacks (advertisements, notifications, link loss)
//! are pushed by the backend onto the [`LinkSender`] it was created with, so
//! that every callback is handled in order on the driver's single task.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::machine::{DiscoveredService, LinkEvent};

/// Sender half of the link event channel.
pub type LinkSender = mpsc::Sender<LinkEvent>;

/// Receiver half of the link event channel.
pub type LinkReceiver = mpsc::Receiver<LinkEvent>;

/// Default capacity of the link event channel.
pub const LINK_CHANNEL_CAPACITY: usize = 256;

/// Create the channel a backend and a driver share.
pub fn link_channel() -> (LinkSender, LinkReceiver) {
    mpsc::channel(LINK_CHANNEL_CAPACITY)
}

/// Bluetooth operations needed to reach the sensor.
///
/// Implementations must tolerate redundant calls (`stop_scan` while not
/// scanning, `release` with no link).
#[async_trait]
pub trait BleBackend: Send + Sync + 'static {
    /// Begin reporting advertisements as [`LinkEvent::Advertisement`].
    async fn start_scan(&self) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    /// Connect to the peripheral with the given address, tearing down any
    /// previous link first.
    async fn connect(&self, address: &str) -> Result<()>;

    /// Discover the GATT layout of the linked peripheral.
    async fn discover_services(&self) -> Result<Vec<DiscoveredService>>;

    /// Enable notifications on each characteristic and return those that
    /// succeeded. Values arrive as [`LinkEvent::Notification`].
    async fn subscribe(&self, characteristics: &[uuid::Uuid]) -> Result<Vec<uuid::Uuid>>;

    /// Disconnect and forget the peripheral. A no-op when nothing is held.
    async fn release(&self) -> Result<()>;

    /// Latest signal strength of the link, if known.
    async fn read_rssi(&self) -> Result<Option<i16>>;
}
