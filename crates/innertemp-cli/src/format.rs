//! Output formatting for scan results, live readings and history queries.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;
use time::Date;

use innertemp_types::{SensorFrame, SessionInfo, Sport, TemperatureEntry, TemperatureStats};

use crate::commands::FoundDevice;
use crate::style;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self {
            no_color,
            compact: false,
        }
    }

    /// Create with compact JSON option.
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }
}

/// Escape a CSV field if it contains special characters.
pub fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

// ============================================================================
// Scan
// ============================================================================

pub fn format_scan_text(devices: &[FoundDevice], opts: &FormatOptions) -> String {
    if devices.is_empty() {
        return "No sensors found.\n".to_string();
    }

    let mut out = style::format_title(&format!("Found {} sensor(s):", devices.len()), opts.no_color);
    out.push('\n');
    for device in devices {
        let _ = writeln!(
            out,
            "  {:<20} {:<40} {}",
            device.name.as_deref().unwrap_or("Unknown"),
            device.address,
            style::format_signal_bar(device.rssi, opts.no_color)
        );
    }
    out
}

pub fn format_scan_json(devices: &[FoundDevice], opts: &FormatOptions) -> Result<String> {
    opts.as_json(&devices)
}

pub fn format_scan_csv(devices: &[FoundDevice]) -> String {
    let mut out = String::from("name,address,rssi\n");
    for device in devices {
        let _ = writeln!(
            out,
            "{},{},{}",
            csv_escape(device.name.as_deref().unwrap_or("")),
            csv_escape(&device.address),
            device.rssi.map(|r| r.to_string()).unwrap_or_default()
        );
    }
    out
}

// ============================================================================
// Live readings
// ============================================================================

/// One line per accepted frame while monitoring.
pub fn format_frame_line(frame: &SensorFrame, average: f64, opts: &FormatOptions) -> String {
    format!(
        "core {} °C  avg {:.1} °C  skin {:.2} °C  outside {:.2} °C  battery {}\n",
        style::format_temp_colored(frame.core_temperature, opts.no_color),
        average,
        frame.skin_temperature,
        frame.outside_temperature,
        style::format_battery_colored(frame.battery_level, opts.no_color),
    )
}

// ============================================================================
// History
// ============================================================================

pub fn format_entries_text(entries: &[TemperatureEntry], opts: &FormatOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<10} {:>8}  {}", "Time", "Core °C", "Sport");
    for entry in entries {
        let _ = writeln!(
            out,
            "{:<10} {:>8}  {}",
            entry.time,
            style::format_temp_colored(entry.temperature, opts.no_color),
            entry.sport
        );
    }
    out
}

pub fn format_entries_csv(entries: &[TemperatureEntry]) -> String {
    let mut out = String::from("time,temperature,sport\n");
    for entry in entries {
        let _ = writeln!(
            out,
            "{},{:?},{}",
            csv_escape(&entry.time),
            entry.temperature,
            entry.sport
        );
    }
    out
}

pub fn format_stats_text(date: Date, stats: &TemperatureStats, opts: &FormatOptions) -> String {
    let scope = stats
        .sport
        .map(|sport| format!(" ({sport})"))
        .unwrap_or_default();
    let mut out = style::format_title(&format!("{date}{scope}"), opts.no_color);
    out.push('\n');
    let _ = writeln!(
        out,
        "  Lowest   {} °C",
        style::format_temp_colored(stats.lowest, opts.no_color)
    );
    let _ = writeln!(
        out,
        "  Highest  {} °C",
        style::format_temp_colored(stats.highest, opts.no_color)
    );
    let _ = writeln!(
        out,
        "  Average  {} °C",
        style::format_temp_colored(stats.average, opts.no_color)
    );
    let _ = writeln!(out, "  Entries  {}", stats.count);
    out
}

pub fn format_stats_csv(stats: &TemperatureStats) -> String {
    format!(
        "lowest,highest,average,count,sport\n{:?},{:?},{:?},{},{}\n",
        stats.lowest,
        stats.highest,
        stats.average,
        stats.count,
        stats.sport.map(|s| s.name()).unwrap_or("")
    )
}

pub fn format_days_text(year: i32, month: u8, days: &BTreeSet<u8>) -> String {
    if days.is_empty() {
        return format!("No data in {year:04}-{month:02}.\n");
    }
    let list: Vec<String> = days.iter().map(|d| format!("{d:02}")).collect();
    format!("{year:04}-{month:02}: {}\n", list.join(" "))
}

pub fn format_days_csv(year: i32, month: u8, days: &BTreeSet<u8>) -> String {
    let mut out = String::from("date\n");
    for day in days {
        let _ = writeln!(out, "{year:04}-{month:02}-{day:02}");
    }
    out
}

pub fn format_sessions_text(sessions: &[SessionInfo]) -> String {
    let mut out = String::new();
    for session in sessions {
        let _ = writeln!(out, "{:<18} {}", session.id, session.sport);
    }
    out
}

pub fn format_sessions_csv(sessions: &[SessionInfo]) -> String {
    let mut out = String::from("id,sport\n");
    for session in sessions {
        let _ = writeln!(out, "{},{}", csv_escape(&session.id), session.sport);
    }
    out
}

pub fn format_sports_text(sports: &[Sport]) -> String {
    let mut out = String::new();
    for sport in sports {
        let _ = writeln!(out, "{sport}");
    }
    out
}

/// Message for a query that found nothing.
pub fn format_no_data(what: &str, opts: &FormatOptions) -> String {
    style::format_warning(&format!("No data for {what}"), opts.no_color) + "\n"
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    fn plain() -> FormatOptions {
        FormatOptions::new(true)
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("simple"), "simple");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_scan_csv() {
        let devices = vec![FoundDevice {
            name: Some("ESP32-GATT".into()),
            address: "24:0A:C4:00:00:01".into(),
            rssi: Some(-61),
        }];
        assert_eq!(
            format_scan_csv(&devices),
            "name,address,rssi\nESP32-GATT,24:0A:C4:00:00:01,-61\n"
        );
    }

    #[test]
    fn test_scan_text_empty() {
        assert_eq!(format_scan_text(&[], &plain()), "No sensors found.\n");
    }

    #[test]
    fn test_entries_csv_matches_session_file() {
        let entries = vec![
            TemperatureEntry::new("08:00:05", 36.45, Sport::Cycling),
            TemperatureEntry::new("08:00:07", 37.0, Sport::Cycling),
        ];
        assert_eq!(
            format_entries_csv(&entries),
            "time,temperature,sport\n08:00:05,36.45,CYCLING\n08:00:07,37.0,CYCLING\n"
        );
    }

    #[test]
    fn test_frame_line_plain() {
        let frame = SensorFrame::from_raw(33.0, 3.5, 80.0);
        assert_eq!(
            format_frame_line(&frame, 36.4, &plain()),
            "core 36.50 °C  avg 36.4 °C  skin 33.00 °C  outside 3.50 °C  battery 80%\n"
        );
    }

    #[test]
    fn test_stats_text_plain() {
        let stats = TemperatureStats {
            lowest: 36.0,
            highest: 38.0,
            average: 37.0,
            count: 3,
            sport: Some(Sport::Kayaking),
        };
        let text = format_stats_text(date!(2024 - 03 - 17), &stats, &plain());
        assert!(text.starts_with("2024-03-17 (KAYAKING)\n"));
        assert!(text.contains("Entries  3"));
    }

    #[test]
    fn test_days_text() {
        let days = BTreeSet::from([3, 17]);
        assert_eq!(format_days_text(2024, 3, &days), "2024-03: 03 17\n");
        assert_eq!(
            format_days_text(2024, 4, &BTreeSet::new()),
            "No data in 2024-04.\n"
        );
        assert_eq!(
            format_days_csv(2024, 3, &days),
            "date\n2024-03-03\n2024-03-17\n"
        );
    }

    #[test]
    fn test_json_compact() {
        let opts = plain().with_compact(true);
        assert_eq!(opts.as_json(&vec![Sport::Running]).unwrap(), "[\"RUNNING\"]\n");
    }
}
