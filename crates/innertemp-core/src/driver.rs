//! Event loop that runs the connection machine against a backend.
//!
//! The [`Driver`] is the only owner of the [`ConnectionMachine`]. It reads
//! [`LinkEvent`]s from one channel, which both the backend's platform
//! callbacks and the [`DriverHandle`]'s user intents feed, executes the
//! resulting [`LinkCommand`]s and publishes [`CompanionEvent`]s.
//!
//! ```no_run
//! use std::sync::Arc;
//! use innertemp_core::{BtleplugBackend, Driver, DriverConfig, link_channel};
//!
//! # async fn run() -> innertemp_core::Result<()> {
//! let (tx, rx) = link_channel();
//! let backend = Arc::new(BtleplugBackend::new(tx.clone()).await?);
//! let (driver, handle) = Driver::new(backend, tx, rx, DriverConfig::default());
//! let mut events = handle.subscribe();
//! let task = driver.spawn();
//!
//! handle.start_scan().await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! handle.shutdown();
//! task.await.ok();
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{BleBackend, LinkReceiver, LinkSender};
use crate::error::Result;
use crate::events::{DEFAULT_EVENT_CAPACITY, EventDispatcher, EventReceiver};
use crate::machine::{
    ConnectionMachine, DEFAULT_SCAN_DURATION, LinkCommand, LinkEvent, Permissions,
};

/// Default RSSI polling interval.
pub const DEFAULT_RSSI_INTERVAL: Duration = Duration::from_secs(2);

/// Shortest accepted RSSI polling interval.
pub const MIN_RSSI_INTERVAL: Duration = Duration::from_secs(1);

/// Driver settings.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Length of one scan window.
    pub scan_duration: Duration,
    /// RSSI polling interval, never below [`MIN_RSSI_INTERVAL`].
    pub rssi_interval: Duration,
    /// Platform permissions granted to the companion.
    pub permissions: Permissions,
    /// Broadcast capacity for companion events.
    pub event_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            scan_duration: DEFAULT_SCAN_DURATION,
            rssi_interval: DEFAULT_RSSI_INTERVAL,
            permissions: Permissions::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl DriverConfig {
    #[must_use]
    pub fn scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Set the RSSI polling interval, clamped to [`MIN_RSSI_INTERVAL`].
    #[must_use]
    pub fn rssi_interval(mut self, interval: Duration) -> Self {
        self.rssi_interval = interval.max(MIN_RSSI_INTERVAL);
        self
    }

    #[must_use]
    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }
}

/// Cloneable handle for sending user intents to a running [`Driver`].
#[derive(Debug, Clone)]
pub struct DriverHandle {
    link_tx: LinkSender,
    dispatcher: EventDispatcher,
    shutdown: CancellationToken,
}

impl DriverHandle {
    /// Subscribe to companion events.
    pub fn subscribe(&self) -> EventReceiver {
        self.dispatcher.subscribe()
    }

    pub async fn start_scan(&self) -> Result<()> {
        self.send(LinkEvent::StartScan).await
    }

    pub async fn toggle_monitoring(&self) -> Result<()> {
        self.send(LinkEvent::ToggleMonitoring).await
    }

    pub async fn toggle_pause(&self) -> Result<()> {
        self.send(LinkEvent::TogglePause).await
    }

    /// Stop scanning, release the link and clear the flags.
    pub async fn close(&self) -> Result<()> {
        self.send(LinkEvent::Close).await
    }

    /// Feed an arbitrary event into the machine.
    pub async fn send(&self, event: LinkEvent) -> Result<()> {
        self.link_tx.send(event).await?;
        Ok(())
    }

    /// Close and stop the driver loop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Owner of the connection machine. See the [module docs](self).
pub struct Driver<B: BleBackend> {
    machine: ConnectionMachine,
    backend: Arc<B>,
    link_tx: LinkSender,
    link_rx: LinkReceiver,
    dispatcher: EventDispatcher,
    rssi_interval: Duration,
    scan_timer: Option<CancellationToken>,
    rssi_poll: Option<CancellationToken>,
    shutdown: CancellationToken,
}

impl<B: BleBackend> Driver<B> {
    /// Create a driver. `link_tx` must be the sender the backend was given.
    pub fn new(
        backend: Arc<B>,
        link_tx: LinkSender,
        link_rx: LinkReceiver,
        config: DriverConfig,
    ) -> (Self, DriverHandle) {
        let machine = ConnectionMachine::new()
            .with_scan_duration(config.scan_duration)
            .with_permissions(config.permissions);
        let dispatcher = EventDispatcher::new(config.event_capacity);
        let shutdown = CancellationToken::new();

        let handle = DriverHandle {
            link_tx: link_tx.clone(),
            dispatcher: dispatcher.clone(),
            shutdown: shutdown.clone(),
        };
        let driver = Self {
            machine,
            backend,
            link_tx,
            link_rx,
            dispatcher,
            rssi_interval: config.rssi_interval.max(MIN_RSSI_INTERVAL),
            scan_timer: None,
            rssi_poll: None,
            shutdown,
        };
        (driver, handle)
    }

    /// Run the loop on a new task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process events until [`DriverHandle::shutdown`] is called.
    pub async fn run(mut self) {
        info!("Driver started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.dispatch(LinkEvent::Close).await;
                    break;
                }
                next = self.link_rx.recv() => match next {
                    Some(event) => self.dispatch(event).await,
                    None => break,
                },
            }
        }
        self.cancel_timers();
        info!("Driver stopped");
    }

    async fn dispatch(&mut self, event: LinkEvent) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let outcome = self.machine.handle(event);
            for event in outcome.events {
                debug!(kind = event.kind(), state = %self.machine.state(), "Companion event");
                self.dispatcher.send(event);
            }
            for command in outcome.commands {
                pending.extend(self.execute(command).await);
            }
        }
    }

    async fn execute(&mut self, command: LinkCommand) -> Vec<LinkEvent> {
        match command {
            LinkCommand::StartScan => match self.backend.start_scan().await {
                Ok(()) => Vec::new(),
                Err(e) => vec![LinkEvent::ScanFailed(e.to_string())],
            },
            LinkCommand::StopScan => {
                if let Err(e) = self.backend.stop_scan().await {
                    warn!(error = %e, "Failed to stop scan");
                }
                Vec::new()
            }
            LinkCommand::ArmScanTimer(duration) => {
                self.arm_scan_timer(duration);
                Vec::new()
            }
            LinkCommand::CancelScanTimer => {
                if let Some(timer) = self.scan_timer.take() {
                    timer.cancel();
                }
                Vec::new()
            }
            LinkCommand::Connect(address) => match self.backend.connect(&address).await {
                Ok(()) => vec![LinkEvent::LinkEstablished],
                Err(e) => vec![LinkEvent::LinkFailed(e.to_string())],
            },
            LinkCommand::DiscoverServices => match self.backend.discover_services().await {
                Ok(services) => vec![LinkEvent::ServicesDiscovered(services)],
                Err(e) => vec![LinkEvent::LinkFailed(e.to_string())],
            },
            LinkCommand::Subscribe(characteristics) => {
                match self.backend.subscribe(&characteristics).await {
                    Ok(enabled) if enabled.is_empty() => vec![LinkEvent::LinkFailed(
                        "no characteristic accepted notifications".to_string(),
                    )],
                    Ok(enabled) => enabled
                        .into_iter()
                        .map(LinkEvent::NotificationsEnabled)
                        .collect(),
                    Err(e) => vec![LinkEvent::LinkFailed(e.to_string())],
                }
            }
            LinkCommand::ReleaseLink => {
                if let Err(e) = self.backend.release().await {
                    warn!(error = %e, "Failed to release link");
                }
                Vec::new()
            }
            LinkCommand::StartRssiPolling => {
                self.start_rssi_polling();
                Vec::new()
            }
            LinkCommand::StopRssiPolling => {
                if let Some(poll) = self.rssi_poll.take() {
                    poll.cancel();
                }
                Vec::new()
            }
        }
    }

    fn arm_scan_timer(&mut self, duration: Duration) {
        if let Some(previous) = self.scan_timer.take() {
            previous.cancel();
        }
        let token = self.shutdown.child_token();
        let cancelled = token.clone();
        let tx = self.link_tx.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    let _ = tx.send(LinkEvent::ScanTimedOut).await;
                }
            }
        });
        self.scan_timer = Some(token);
    }

    fn start_rssi_polling(&mut self) {
        if let Some(previous) = self.rssi_poll.take() {
            previous.cancel();
        }
        let token = self.shutdown.child_token();
        let cancelled = token.clone();
        let tx = self.link_tx.clone();
        let backend = Arc::clone(&self.backend);
        let interval = self.rssi_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                match backend.read_rssi().await {
                    Ok(Some(rssi)) => {
                        if tx.send(LinkEvent::RssiUpdated(rssi)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => debug!(error = %e, "RSSI read failed"),
                }
            }
        });
        self.rssi_poll = Some(token);
    }

    fn cancel_timers(&mut self) {
        for token in [self.scan_timer.take(), self.rssi_poll.take()]
            .into_iter()
            .flatten()
        {
            token.cancel();
        }
    }
}
