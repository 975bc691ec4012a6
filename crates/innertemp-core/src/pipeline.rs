//! Routing of companion events to the store, the average and the gateway.

use std::time::Instant;

use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use innertemp_types::{SensorFrame, SessionSink, Sport};

use crate::aggregator::RunningAverage;
use crate::events::{CompanionEvent, EventReceiver};
use crate::gateway::{AlertPolicy, LinkFlags, MirrorGateway, MirrorRecord};

/// Consumes [`CompanionEvent`]s and feeds every collaborator.
///
/// - Monitoring switched on starts a new session for the configured sport
///   and resets the running average and the alert rate limits.
/// - Each accepted frame updates the average, is logged to the session when
///   its core temperature is positive, is checked against the alert policy
///   and is mirrored.
/// - Each status change is mirrored.
pub struct Pipeline {
    sink: Box<dyn SessionSink>,
    gateway: Box<dyn MirrorGateway>,
    alerts: AlertPolicy,
    average: RunningAverage,
    sport: Sport,
    last_frame: Option<SensorFrame>,
    flags: LinkFlags,
}

impl Pipeline {
    pub fn new(
        sink: Box<dyn SessionSink>,
        gateway: Box<dyn MirrorGateway>,
        alerts: AlertPolicy,
        sport: Sport,
    ) -> Self {
        Self {
            sink,
            gateway,
            alerts,
            average: RunningAverage::new(),
            sport,
            last_frame: None,
            flags: LinkFlags::default(),
        }
    }

    /// Sport used for the next session.
    pub fn set_sport(&mut self, sport: Sport) {
        self.sport = sport;
    }

    pub fn average(&self) -> &RunningAverage {
        &self.average
    }

    pub fn flags(&self) -> LinkFlags {
        self.flags
    }

    /// Handle one event observed at `now` (monotonic) and `at` (wall clock).
    pub fn handle(&mut self, event: &CompanionEvent, now: Instant, at: OffsetDateTime) {
        match event {
            CompanionEvent::ConnectionStatusChanged { connected } => {
                self.flags.connected = *connected;
            }
            CompanionEvent::MonitoringStatusChanged { monitoring } => {
                self.flags.monitoring = *monitoring;
                if *monitoring {
                    debug!(sport = %self.sport, "Starting new session");
                    self.sink.start_new_session(self.sport);
                    self.average.reset();
                    self.alerts.reset();
                }
            }
            CompanionEvent::PauseStatusChanged { paused } => {
                self.flags.paused = *paused;
            }
            CompanionEvent::DataReceived { frame } => {
                self.average.update(frame.core_temperature);
                if frame.core_temperature > 0.0 {
                    self.sink.log_temperature(frame.core_temperature);
                }
                for alert in self.alerts.evaluate(frame, now) {
                    self.gateway.alert(&alert);
                }
                self.last_frame = Some(*frame);
            }
            _ => return,
        }

        let record = MirrorRecord::new(
            self.last_frame.as_ref(),
            self.average.average(),
            self.flags,
            at,
        );
        self.gateway.publish(&record);
    }

    /// Consume events until the channel closes.
    pub async fn run(mut self, mut events: EventReceiver) {
        loop {
            match events.recv().await {
                Ok(event) => self.handle(&event, Instant::now(), OffsetDateTime::now_utc()),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Pipeline fell behind, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
