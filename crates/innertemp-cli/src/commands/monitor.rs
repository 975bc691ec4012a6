//! Monitor command implementation.
//!
//! Connects to the first sensor found, starts a session as soon as the link
//! is up and logs every reading through the background session writer. A
//! lost link is followed by a new scan with exponential backoff. While
//! running, typing `p` pauses or resumes logging, `m` toggles monitoring
//! and `q` quits.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, warn};

use innertemp_core::{
    BtleplugBackend, CompanionEvent, Driver, DriverHandle, EventReceiver, MirrorGateway, Pipeline,
    RunningAverage, TracingGateway, link_channel,
};
use innertemp_store::{SessionLog, SessionWriter, StoreEvent};
use innertemp_types::SessionInfo;

use crate::cli::MonitorArgs;
use crate::config::{Config, ThresholdConfig};
use crate::format::{FormatOptions, format_frame_line};
use crate::style;

/// Minimum backoff delay before scanning again
const MIN_BACKOFF: Duration = Duration::from_secs(2);
/// Maximum backoff delay before scanning again
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// A command typed while monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    TogglePause,
    ToggleMonitoring,
    Quit,
}

impl Control {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" | "resume" => Some(Control::TogglePause),
            "m" | "monitor" => Some(Control::ToggleMonitoring),
            "q" | "quit" | "exit" => Some(Control::Quit),
            _ => None,
        }
    }
}

/// How the supervisor reports progress.
#[derive(Debug, Clone, Copy)]
pub struct Reporting {
    /// Print one line per reading on stdout.
    pub print_frames: bool,
    /// Suppress status lines on stderr.
    pub quiet: bool,
    pub opts: FormatOptions,
}

/// What happened during a monitoring run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub readings: u32,
    pub written: u32,
    pub lost: u32,
    pub session: Option<SessionInfo>,
}

pub async fn cmd_monitor(
    args: MonitorArgs,
    config: &Config,
    data_dir: PathBuf,
    quiet: bool,
    opts: &FormatOptions,
) -> Result<()> {
    let sport = args.sport.unwrap_or(config.sport);
    let thresholds = ThresholdConfig {
        mode: args.mode.unwrap_or(config.thresholds.mode),
        level: args.level.or(config.thresholds.level),
        custom_low: args.low.or(config.thresholds.custom_low),
        custom_high: args.high.or(config.thresholds.custom_high),
    };
    let json = args.json || config.mirror_json;

    let log = SessionLog::open(&data_dir)
        .with_context(|| format!("Failed to open session log at {}", data_dir.display()))?;
    let writer = SessionWriter::spawn(log);
    let mut store_events = writer.subscribe();

    let (tx, rx) = link_channel();
    let backend = Arc::new(
        BtleplugBackend::new(tx.clone())
            .await
            .context("Failed to open Bluetooth adapter")?,
    );
    let (driver, handle) = Driver::new(
        backend,
        tx,
        rx,
        config.driver_config(args.timeout, args.rssi_interval),
    );

    let gateway: Box<dyn MirrorGateway> = if json {
        Box::new(TracingGateway::with_stdout_json())
    } else {
        Box::new(TracingGateway::new())
    };
    let pipeline = Pipeline::new(
        Box::new(writer),
        gateway,
        config.alert_policy(&thresholds, args.no_alerts),
        sport,
    );
    let pipeline_task = tokio::spawn(pipeline.run(handle.subscribe()));
    let events = handle.subscribe();
    let driver_task = driver.spawn();

    let reporting = Reporting {
        print_frames: !json,
        quiet,
        opts: *opts,
    };
    if !quiet {
        eprintln!(
            "{}",
            style::format_info(
                &format!("Looking for a sensor, logging {sport} sessions (p: pause, m: monitor, q: quit)"),
                opts.no_color
            )
        );
    }

    handle.start_scan().await?;
    let result = supervise(
        &handle,
        events,
        &mut store_events,
        spawn_controls(),
        args.count,
        reporting,
    )
    .await;

    handle.shutdown();
    if let Err(e) = driver_task.await {
        warn!(error = %e, "Driver task failed");
    }
    drop(handle);
    if let Err(e) = pipeline_task.await {
        warn!(error = %e, "Pipeline task failed");
    }

    let mut summary = result?;
    drain_store_events(&mut store_events, &mut summary).await;
    if !quiet {
        eprintln!("{}", format_summary(&summary, &data_dir, opts));
    }
    Ok(())
}

/// Forward typed commands from a dedicated thread.
///
/// A plain thread rather than `tokio::io::stdin`, whose blocking read would
/// hold up runtime shutdown until the next line.
fn spawn_controls() -> mpsc::Receiver<Control> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let Some(control) = Control::parse(&line) else {
                continue;
            };
            if tx.blocking_send(control).is_err() {
                break;
            }
        }
    });
    rx
}

/// React to companion events until quit, Ctrl-C, `count` readings or a
/// fatal scan outcome.
pub async fn supervise(
    handle: &DriverHandle,
    mut events: EventReceiver,
    store_events: &mut broadcast::Receiver<StoreEvent>,
    mut controls: mpsc::Receiver<Control>,
    count: Option<u32>,
    reporting: Reporting,
) -> Result<Summary> {
    let status = |message: &str| {
        if !reporting.quiet {
            eprintln!("{}", style::format_info(message, reporting.opts.no_color));
        }
    };

    let mut summary = Summary::default();
    let mut average = RunningAverage::new();
    let mut monitoring = false;
    let mut connected_once = false;
    let mut controls_open = true;
    let mut store_open = true;
    let mut backoff = MIN_BACKOFF;
    let mut rescan_at: Option<Instant> = None;

    loop {
        let rescan = rescan_at;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                status("Shutting down...");
                break;
            }
            _ = tokio::time::sleep_until(rescan.unwrap_or_else(Instant::now)), if rescan.is_some() => {
                rescan_at = None;
                status("Scanning again...");
                handle.start_scan().await?;
            }
            control = controls.recv(), if controls_open => match control {
                Some(Control::TogglePause) => handle.toggle_pause().await?,
                Some(Control::ToggleMonitoring) => handle.toggle_monitoring().await?,
                Some(Control::Quit) => break,
                None => controls_open = false,
            },
            stored = store_events.recv(), if store_open => match stored {
                Ok(event) => record_store_event(&mut summary, event, &reporting),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed store events");
                }
                Err(broadcast::error::RecvError::Closed) => store_open = false,
            },
            event = events.recv() => match event {
                Ok(CompanionEvent::DeviceFound { address, name, rssi }) => {
                    status(&format!(
                        "Found {} ({address}) {}",
                        name,
                        style::format_signal_bar(rssi, reporting.opts.no_color)
                    ));
                }
                Ok(CompanionEvent::ConnectionStatusChanged { connected: true }) => {
                    connected_once = true;
                    backoff = MIN_BACKOFF;
                    status("Connected");
                    if !monitoring {
                        handle.toggle_monitoring().await?;
                    }
                }
                Ok(CompanionEvent::ConnectionStatusChanged { connected: false }) => {
                    status(&format!("Disconnected, scanning again in {}s", backoff.as_secs()));
                    rescan_at = Some(Instant::now() + backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Ok(CompanionEvent::MonitoringStatusChanged { monitoring: on }) => {
                    monitoring = on;
                    if on {
                        average.reset();
                        status("Monitoring started");
                    } else {
                        status("Monitoring stopped");
                    }
                }
                Ok(CompanionEvent::PauseStatusChanged { paused }) => {
                    if monitoring {
                        status(if paused { "Paused" } else { "Resumed" });
                    }
                }
                Ok(CompanionEvent::DataReceived { frame }) => {
                    summary.readings += 1;
                    average.update(frame.core_temperature);
                    if reporting.print_frames {
                        print!("{}", format_frame_line(&frame, average.average(), &reporting.opts));
                    }
                    if count.is_some_and(|limit| summary.readings >= limit) {
                        status(&format!("Completed {} readings.", summary.readings));
                        break;
                    }
                }
                Ok(CompanionEvent::ScanTimedOut) => {
                    if !connected_once {
                        bail!("No InnerTemp sensor found. Make sure it is powered on and in range.");
                    }
                    status(&format!("Sensor not found, scanning again in {}s", backoff.as_secs()));
                    rescan_at = Some(Instant::now() + backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Ok(CompanionEvent::ScanFailed { reason }) => bail!("Scan failed: {reason}"),
                Ok(CompanionEvent::Error { message }) => {
                    if !reporting.quiet {
                        eprintln!("{}", style::format_warning(&message, reporting.opts.no_color));
                    }
                }
                Ok(other) => debug!(kind = other.kind(), "Ignored event"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed companion events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    Ok(summary)
}

fn record_store_event(summary: &mut Summary, event: StoreEvent, reporting: &Reporting) {
    match event {
        StoreEvent::SessionStarted { session } => summary.session = Some(session),
        StoreEvent::EntryWritten { .. } => summary.written += 1,
        StoreEvent::WriteLost { temperature, reason } => {
            summary.lost += 1;
            if !reporting.quiet {
                eprintln!(
                    "{}",
                    style::format_warning(
                        &format!("Could not log {temperature:.2} °C: {reason}"),
                        reporting.opts.no_color
                    )
                );
            }
        }
    }
}

/// Count the outcomes of writes still queued when monitoring ended.
async fn drain_store_events(store_events: &mut broadcast::Receiver<StoreEvent>, summary: &mut Summary) {
    let quiet = Reporting {
        print_frames: false,
        quiet: true,
        opts: FormatOptions::default(),
    };
    loop {
        match store_events.recv().await {
            Ok(event) => record_store_event(summary, event, &quiet),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn format_summary(summary: &Summary, data_dir: &Path, opts: &FormatOptions) -> String {
    let session = summary
        .session
        .as_ref()
        .map(|s| format!(" in session {} ({})", s.id, s.sport))
        .unwrap_or_default();
    let mut message = format!(
        "{} readings, {} logged{session} to {}",
        summary.readings,
        summary.written,
        data_dir.display()
    );
    if summary.lost > 0 {
        message.push_str(&format!(", {} lost", summary.lost));
        return style::format_warning(&message, opts.no_color);
    }
    style::format_info(&message, opts.no_color)
}
