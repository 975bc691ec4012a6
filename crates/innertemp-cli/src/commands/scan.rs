//! Scan command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use innertemp_core::{BleBackend, BtleplugBackend, LinkEvent, LinkReceiver, link_channel};
use innertemp_types::uuid::is_sensor_name;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_scan_csv, format_scan_json, format_scan_text};
use crate::style;
use crate::util::write_output;

/// A sensor seen while scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoundDevice {
    pub name: Option<String>,
    pub address: String,
    pub rssi: Option<i16>,
}

pub async fn cmd_scan(
    duration: Duration,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    opts: &FormatOptions,
) -> Result<()> {
    if !quiet && matches!(format, OutputFormat::Text) {
        eprintln!(
            "{}",
            style::format_info(
                &format!("Scanning for sensors... ({}s)", duration.as_secs()),
                opts.no_color
            )
        );
    }

    let (tx, mut rx) = link_channel();
    let backend = BtleplugBackend::new(tx)
        .await
        .context("Failed to open Bluetooth adapter")?;
    let devices = collect_devices(&backend, &mut rx, duration)
        .await
        .context("Failed to scan for sensors")?;

    let content = match format {
        OutputFormat::Json => format_scan_json(&devices, opts)?,
        OutputFormat::Text => format_scan_text(&devices, opts),
        OutputFormat::Csv => format_scan_csv(&devices),
    };
    write_output(output, &content)
}

/// Scan for `duration` and return the sensors seen, strongest first.
///
/// Repeated advertisements update the name and signal of a device.
pub async fn collect_devices<B: BleBackend>(
    backend: &B,
    rx: &mut LinkReceiver,
    duration: Duration,
) -> Result<Vec<FoundDevice>> {
    backend.start_scan().await?;
    let deadline = Instant::now() + duration;
    let mut devices: Vec<FoundDevice> = Vec::new();

    while let Ok(Some(event)) = timeout_at(deadline, rx.recv()).await {
        let LinkEvent::Advertisement {
            address,
            name,
            rssi,
        } = event
        else {
            continue;
        };
        if !name.as_deref().is_some_and(is_sensor_name) {
            continue;
        }
        debug!(%address, ?name, ?rssi, "Sensor advertisement");

        match devices.iter_mut().find(|d| d.address == address) {
            Some(device) => {
                device.name = name.or(device.name.take());
                device.rssi = rssi.or(device.rssi);
            }
            None => devices.push(FoundDevice {
                name,
                address,
                rssi,
            }),
        }
    }

    backend.stop_scan().await?;
    devices.sort_by_key(|d| std::cmp::Reverse(d.rssi.unwrap_or(i16::MIN)));
    Ok(devices)
}
