//! Background writer that keeps file I/O off the connection event loop.

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use innertemp_types::{SessionInfo, SessionSink, Sport};

use crate::store::{SessionLog, local_now};

/// Capacity of the [`StoreEvent`] broadcast channel.
pub const STORE_EVENT_CAPACITY: usize = 64;

/// Outcome of a queued store command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A new session became current.
    SessionStarted { session: SessionInfo },
    /// A temperature reached disk.
    EntryWritten {
        session: SessionInfo,
        temperature: f64,
    },
    /// A temperature could not be written and is gone.
    WriteLost { temperature: f64, reason: String },
}

#[derive(Debug)]
enum Command {
    StartSession(Sport, OffsetDateTime),
    Log(f64, OffsetDateTime),
}

/// Runs a [`SessionLog`] on a blocking task fed by a queue.
///
/// Both [`SessionSink`] methods enqueue and return immediately. Each entry
/// is stamped with the time it was queued, not the time it was written.
///
/// ```no_run
/// use innertemp_store::{SessionLog, SessionWriter};
/// use innertemp_types::{SessionSink, Sport};
///
/// # async fn run() -> innertemp_store::Result<()> {
/// let writer = SessionWriter::spawn(SessionLog::open_default()?);
/// writer.start_new_session(Sport::Cycling);
/// writer.log_temperature(36.8);
/// writer.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SessionWriter {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<StoreEvent>,
    task: JoinHandle<SessionLog>,
}

impl SessionWriter {
    /// Move `log` onto a blocking task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(log: SessionLog) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(STORE_EVENT_CAPACITY);
        let task = tokio::task::spawn_blocking({
            let events = events.clone();
            move || run(log, rx, events)
        });
        Self {
            commands,
            events,
            task,
        }
    }

    /// Subscribe to write outcomes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Drain the queue and hand the log back.
    ///
    /// Returns `None` if the writer task panicked.
    pub async fn shutdown(self) -> Option<SessionLog> {
        drop(self.commands);
        match self.task.await {
            Ok(log) => Some(log),
            Err(e) => {
                warn!(error = %e, "Session writer task failed");
                None
            }
        }
    }

    fn enqueue(&self, command: Command) {
        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            warn!(?command, "Session writer stopped, command dropped");
        }
    }
}

impl SessionSink for SessionWriter {
    fn start_new_session(&self, sport: Sport) {
        self.enqueue(Command::StartSession(sport, local_now()));
    }

    fn log_temperature(&self, core_temperature: f64) {
        self.enqueue(Command::Log(core_temperature, local_now()));
    }
}

fn run(
    mut log: SessionLog,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<StoreEvent>,
) -> SessionLog {
    debug!("Session writer started");
    while let Some(command) = commands.blocking_recv() {
        let event = match command {
            Command::StartSession(sport, at) => StoreEvent::SessionStarted {
                session: log.start_new_session_at(sport, at),
            },
            Command::Log(temperature, at) => match log.try_log_temperature_at(temperature, at) {
                Ok(_) => StoreEvent::EntryWritten {
                    session: log.current_session(),
                    temperature,
                },
                Err(e) => {
                    warn!(error = %e, temperature, "Failed to log temperature");
                    StoreEvent::WriteLost {
                        temperature,
                        reason: e.to_string(),
                    }
                }
            },
        };
        // No subscribers is fine.
        let _ = events.send(event);
    }
    debug!("Session writer stopped");
    log
}
