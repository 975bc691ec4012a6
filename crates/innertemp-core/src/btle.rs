//! [`BleBackend`] on top of btleplug.
//!
//! The backend owns one adapter and at most one peripheral. A background
//! task turns the adapter's central event stream into
//! [`LinkEvent::Advertisement`] and [`LinkEvent::LinkLost`]; a second task,
//! started by [`BleBackend::subscribe`], forwards characteristic values as
//! [`LinkEvent::Notification`].

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BleBackend, LinkSender};
use crate::error::{Error, Result};
use crate::machine::{
    CharacteristicProperties, DiscoveredCharacteristic, DiscoveredService, LinkEvent,
};

type CentralEvents = Pin<Box<dyn Stream<Item = CentralEvent> + Send>>;

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters.into_iter().next().ok_or(Error::NoAdapter)
}

/// btleplug-backed Bluetooth access.
pub struct BtleplugBackend {
    adapter: Adapter,
    link_tx: LinkSender,
    current: Arc<RwLock<Option<Peripheral>>>,
    notifications: Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for BtleplugBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugBackend").finish_non_exhaustive()
    }
}

impl BtleplugBackend {
    /// Open the first adapter and start forwarding its events to `link_tx`.
    pub async fn new(link_tx: LinkSender) -> Result<Self> {
        let adapter = get_adapter().await?;
        Self::with_adapter(adapter, link_tx).await
    }

    /// Use a specific adapter.
    pub async fn with_adapter(adapter: Adapter, link_tx: LinkSender) -> Result<Self> {
        let events = adapter.events().await?;
        let current = Arc::new(RwLock::new(None));
        let shutdown = CancellationToken::new();

        tokio::spawn(forward_central_events(
            adapter.clone(),
            events,
            link_tx.clone(),
            Arc::clone(&current),
            shutdown.clone(),
        ));

        Ok(Self {
            adapter,
            link_tx,
            current,
            notifications: Mutex::new(None),
            shutdown,
        })
    }

    async fn linked(&self) -> Result<Peripheral> {
        self.current.read().await.clone().ok_or(Error::NotConnected)
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        for peripheral in self.adapter.peripherals().await? {
            let id = peripheral.id();
            let identifier = match peripheral.properties().await? {
                Some(props) => create_identifier(&props.address.to_string(), &id),
                None => format_peripheral_id(&id),
            };
            if identifier.eq_ignore_ascii_case(address) {
                return Ok(peripheral);
            }
        }
        Err(Error::device_not_found(address))
    }

    async fn forward_notifications(&self, peripheral: &Peripheral) -> Result<()> {
        let mut stream = peripheral.notifications().await?;
        let token = self.shutdown.child_token();
        if let Some(previous) = self.notifications.lock().await.replace(token.clone()) {
            previous.cancel();
        }

        let tx = self.link_tx.clone();
        tokio::spawn(async move {
            loop {
                let notification = tokio::select! {
                    _ = token.cancelled() => break,
                    next = stream.next() => match next {
                        Some(n) => n,
                        None => break,
                    },
                };
                if tx
                    .send(LinkEvent::Notification(notification.value))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            debug!("Notification forwarding stopped");
        });
        Ok(())
    }
}

#[async_trait]
impl BleBackend for BtleplugBackend {
    async fn start_scan(&self) -> Result<()> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn connect(&self, address: &str) -> Result<()> {
        self.release().await?;

        let peripheral = self.find_peripheral(address).await?;
        peripheral.connect().await?;
        info!("Peripheral connected");
        *self.current.write().await = Some(peripheral);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn discover_services(&self) -> Result<Vec<DiscoveredService>> {
        let peripheral = self.linked().await?;
        peripheral.discover_services().await?;

        let services = peripheral
            .services()
            .into_iter()
            .map(|service| DiscoveredService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|c| DiscoveredCharacteristic {
                        uuid: c.uuid,
                        properties: properties_from(c.properties),
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();
        debug!(count = services.len(), "Services discovered");
        Ok(services)
    }

    #[tracing::instrument(skip(self))]
    async fn subscribe(&self, characteristics: &[Uuid]) -> Result<Vec<Uuid>> {
        let peripheral = self.linked().await?;

        let mut enabled = Vec::new();
        for characteristic in peripheral.characteristics() {
            if !characteristics.contains(&characteristic.uuid)
                || enabled.contains(&characteristic.uuid)
            {
                continue;
            }
            match peripheral.subscribe(&characteristic).await {
                Ok(()) => enabled.push(characteristic.uuid),
                Err(e) => warn!(uuid = %characteristic.uuid, error = %e, "Subscribe failed"),
            }
        }

        if !enabled.is_empty() {
            self.forward_notifications(&peripheral).await?;
        }
        Ok(enabled)
    }

    #[tracing::instrument(skip(self))]
    async fn release(&self) -> Result<()> {
        if let Some(token) = self.notifications.lock().await.take() {
            token.cancel();
        }
        let Some(peripheral) = self.current.write().await.take() else {
            return Ok(());
        };
        if peripheral.is_connected().await.unwrap_or(false) {
            peripheral.disconnect().await?;
            info!("Peripheral released");
        }
        Ok(())
    }

    async fn read_rssi(&self) -> Result<Option<i16>> {
        let Some(peripheral) = self.current.read().await.clone() else {
            return Ok(None);
        };
        Ok(peripheral.properties().await?.and_then(|p| p.rssi))
    }
}

impl Drop for BtleplugBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();

        let Ok(mut current) = self.current.try_write() else {
            return;
        };
        let Some(peripheral) = current.take() else {
            return;
        };
        warn!("Backend dropped with a live link, disconnecting in background");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!(error = %e, "Best-effort disconnect failed");
                }
            });
        }
    }
}

async fn forward_central_events(
    adapter: Adapter,
    mut events: CentralEvents,
    tx: LinkSender,
    current: Arc<RwLock<Option<Peripheral>>>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = events.next() => match next {
                Some(event) => event,
                None => break,
            },
        };

        let forwarded = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                advertisement_for(&adapter, &id).await
            }
            CentralEvent::DeviceDisconnected(id) => {
                let linked = current
                    .read()
                    .await
                    .as_ref()
                    .is_some_and(|p| p.id() == id);
                linked.then_some(LinkEvent::LinkLost)
            }
            _ => None,
        };

        if let Some(event) = forwarded
            && tx.send(event).await.is_err()
        {
            break;
        }
    }
    debug!("Central event forwarding stopped");
}

async fn advertisement_for(adapter: &Adapter, id: &PeripheralId) -> Option<LinkEvent> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let props = peripheral.properties().await.ok().flatten()?;
    let name = props.local_name?;

    Some(LinkEvent::Advertisement {
        address: create_identifier(&props.address.to_string(), id),
        name: Some(name),
        rssi: props.rssi,
    })
}

fn properties_from(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        read: flags.contains(CharPropFlags::READ),
        write: flags.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}

/// Strip the `PeripheralId(...)` wrapper from the debug form of an id.
fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{id:?}")
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Address to report for a peripheral.
///
/// macOS hides MAC addresses behind `00:00:00:00:00:00`; the peripheral id is
/// stable there and is used instead.
fn create_identifier(address: &str, id: &PeripheralId) -> String {
    if address == "00:00:00:00:00:00" {
        format_peripheral_id(id)
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_mapping() {
        let props = properties_from(CharPropFlags::READ | CharPropFlags::NOTIFY);
        assert!(props.read);
        assert!(props.notify);
        assert!(!props.write);
        assert!(props.is_fallback_candidate());

        let props = properties_from(CharPropFlags::WRITE_WITHOUT_RESPONSE);
        assert!(props.write);
        assert!(!props.is_fallback_candidate());
    }
}
