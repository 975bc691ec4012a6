//! Mirror records and alerts.
//!
//! Every accepted frame and every status change is turned into a
//! [`MirrorRecord`] and handed to a [`MirrorGateway`], the seam where a
//! watch companion or any other consumer attaches. The [`AlertPolicy`]
//! decides when a frame warrants a user-facing [`Alert`]; it keeps its
//! rate-limit state explicitly and takes the current instant as an
//! argument so it can be driven deterministically.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use innertemp_types::{SensorFrame, ThresholdRange};

/// Minimum spacing between two temperature alerts of the same kind.
pub const TEMPERATURE_ALERT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Battery level at or below which a low-battery alert fires.
pub const BATTERY_LOW_LEVEL: f64 = 30.0;

/// Battery level at or below which a critical-battery alert fires.
pub const BATTERY_CRITICAL_LEVEL: f64 = 15.0;

/// Snapshot of everything a mirror consumer shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorRecord {
    pub core_temp: f64,
    pub skin_temp: f64,
    pub outside_temp: f64,
    pub avg_core_temp: f64,
    pub battery_level: f64,
    pub is_connected: bool,
    pub is_monitoring: bool,
    pub is_paused: bool,
    /// Unix time in milliseconds.
    pub timestamp: i64,
}

/// Link and session flags carried by a [`MirrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkFlags {
    pub connected: bool,
    pub monitoring: bool,
    pub paused: bool,
}

impl MirrorRecord {
    /// Build a record from the latest frame (if any), the running average and
    /// the flags, stamped with `at`.
    pub fn new(
        frame: Option<&SensorFrame>,
        avg_core_temp: f64,
        flags: LinkFlags,
        at: OffsetDateTime,
    ) -> Self {
        let frame = frame.copied().unwrap_or_default();
        Self {
            core_temp: frame.core_temperature,
            skin_temp: frame.skin_temperature,
            outside_temp: frame.outside_temperature,
            avg_core_temp,
            battery_level: frame.battery_level,
            is_connected: flags.connected,
            is_monitoring: flags.monitoring,
            is_paused: flags.paused,
            timestamp: unix_millis(at),
        }
    }
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// A condition worth telling the user about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alert {
    HighTemperature { current: f64, threshold: f64 },
    LowTemperature { current: f64, threshold: f64 },
    BatteryLow { level: f64 },
    BatteryCritical { level: f64 },
}

impl Alert {
    pub fn title(&self) -> &'static str {
        match self {
            Alert::HighTemperature { .. } => "High Temperature Alert",
            Alert::LowTemperature { .. } => "Low Temperature Alert",
            Alert::BatteryLow { .. } => "Low Battery Warning",
            Alert::BatteryCritical { .. } => "Critical Battery Warning",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Alert::HighTemperature { current, threshold } => format!(
                "Core temperature is {current:.1}°C, exceeding the threshold of {threshold:.1}°C."
            ),
            Alert::LowTemperature { current, threshold } => format!(
                "Core temperature is {current:.1}°C, below the threshold of {threshold:.1}°C."
            ),
            Alert::BatteryLow { level } => {
                format!("Battery level is at {level:.0}%. Please charge soon.")
            }
            Alert::BatteryCritical { level } => {
                format!("Battery level is critically low at {level:.0}%.")
            }
        }
    }
}

/// Decides which alerts a frame raises.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    range: ThresholdRange,
    enabled: bool,
    interval: Duration,
    last_high: Option<Instant>,
    last_low: Option<Instant>,
    last_battery: Option<f64>,
}

impl AlertPolicy {
    pub fn new(range: ThresholdRange) -> Self {
        Self {
            range,
            enabled: true,
            interval: TEMPERATURE_ALERT_INTERVAL,
            last_high: None,
            last_low: None,
            last_battery: None,
        }
    }

    /// Override the temperature alert spacing.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn range(&self) -> ThresholdRange {
        self.range
    }

    pub fn set_range(&mut self, range: ThresholdRange) {
        self.range = range;
    }

    /// Clear the temperature rate limits and the remembered battery level.
    pub fn reset(&mut self) {
        self.last_high = None;
        self.last_low = None;
        self.last_battery = None;
    }

    /// Evaluate one frame observed at `now`.
    ///
    /// Temperature alerts are rate limited per kind. Battery alerts fire when
    /// the level first drops to or below a threshold; the first frame of a
    /// session counts as a drop from full.
    pub fn evaluate(&mut self, frame: &SensorFrame, now: Instant) -> Vec<Alert> {
        if !self.enabled {
            return Vec::new();
        }
        let mut alerts = Vec::new();

        let core = frame.core_temperature;
        if core > 0.0 {
            if core > self.range.high && Self::due(self.last_high, now, self.interval) {
                self.last_high = Some(now);
                alerts.push(Alert::HighTemperature {
                    current: core,
                    threshold: self.range.high,
                });
            } else if core < self.range.low && Self::due(self.last_low, now, self.interval) {
                self.last_low = Some(now);
                alerts.push(Alert::LowTemperature {
                    current: core,
                    threshold: self.range.low,
                });
            }
        }

        let level = frame.battery_level;
        let previous = self.last_battery.unwrap_or(f64::INFINITY);
        if level <= BATTERY_CRITICAL_LEVEL && previous > BATTERY_CRITICAL_LEVEL {
            alerts.push(Alert::BatteryCritical { level });
        } else if level <= BATTERY_LOW_LEVEL && previous > BATTERY_LOW_LEVEL {
            alerts.push(Alert::BatteryLow { level });
        }
        self.last_battery = Some(level);

        alerts
    }

    fn due(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
        last.is_none_or(|at| now.saturating_duration_since(at) >= interval)
    }
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self::new(ThresholdRange::default())
    }
}

/// Consumer of mirror records and alerts.
pub trait MirrorGateway: Send {
    /// Publish the latest snapshot.
    fn publish(&mut self, record: &MirrorRecord);

    /// Deliver an alert to the user.
    fn alert(&mut self, alert: &Alert);
}

/// Gateway that logs through `tracing` and can also emit JSON lines.
#[derive(Debug)]
pub struct TracingGateway<W = io::Stdout> {
    json: Option<W>,
}

impl TracingGateway {
    /// Log only.
    pub fn new() -> Self {
        Self { json: None }
    }

    /// Log and print each record and alert as one JSON line on stdout.
    pub fn with_stdout_json() -> Self {
        Self {
            json: Some(io::stdout()),
        }
    }
}

impl Default for TracingGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> TracingGateway<W> {
    /// Log and write JSON lines to `writer`.
    pub fn with_json_writer(writer: W) -> Self {
        Self { json: Some(writer) }
    }

    /// Take back the JSON writer.
    pub fn into_writer(self) -> Option<W> {
        self.json
    }

    fn write_json<T: Serialize>(&mut self, value: &T) {
        let Some(writer) = self.json.as_mut() else {
            return;
        };
        let result = serde_json::to_writer(&mut *writer, value)
            .map_err(io::Error::from)
            .and_then(|()| writeln!(writer))
            .and_then(|()| writer.flush());
        if let Err(e) = result {
            warn!(error = %e, "Failed to write mirror output");
        }
    }
}

impl<W: Write + Send> MirrorGateway for TracingGateway<W> {
    fn publish(&mut self, record: &MirrorRecord) {
        debug!(
            core = record.core_temp,
            avg = record.avg_core_temp,
            battery = record.battery_level,
            connected = record.is_connected,
            monitoring = record.is_monitoring,
            paused = record.is_paused,
            "Mirror update"
        );
        self.write_json(record);
    }

    fn alert(&mut self, alert: &Alert) {
        warn!(title = alert.title(), "{}", alert.message());
        self.write_json(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(core_parts: (f64, f64), battery: f64) -> SensorFrame {
        SensorFrame::from_raw(core_parts.0, core_parts.1, battery)
    }

    fn policy() -> AlertPolicy {
        AlertPolicy::new(ThresholdRange::new(37.0, 38.0))
    }

    #[test]
    fn test_record_from_frame() {
        let f = frame((33.0, 3.5), 77.0);
        let flags = LinkFlags {
            connected: true,
            monitoring: true,
            paused: false,
        };
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let record = MirrorRecord::new(Some(&f), 36.4, flags, at);

        assert_eq!(record.core_temp, 36.5);
        assert_eq!(record.avg_core_temp, 36.4);
        assert_eq!(record.battery_level, 77.0);
        assert!(record.is_connected);
        assert_eq!(record.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_record_without_frame_is_zeroed() {
        let at = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let record = MirrorRecord::new(None, 0.0, LinkFlags::default(), at);
        assert_eq!(record.core_temp, 0.0);
        assert!(!record.is_monitoring);
    }

    #[test]
    fn test_record_json_field_names() {
        let at = OffsetDateTime::from_unix_timestamp(1).unwrap();
        let record = MirrorRecord::new(None, 0.0, LinkFlags::default(), at);
        let json = serde_json::to_value(&record).unwrap();
        for key in [
            "core_temp",
            "skin_temp",
            "outside_temp",
            "avg_core_temp",
            "battery_level",
            "is_connected",
            "is_monitoring",
            "is_paused",
            "timestamp",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_high_temperature_rate_limited() {
        let mut policy = policy();
        let start = Instant::now();
        let hot = frame((36.0, 2.5), 90.0);

        assert_eq!(policy.evaluate(&hot, start).len(), 1);
        assert!(policy.evaluate(&hot, start + Duration::from_secs(60)).is_empty());
        let later = policy.evaluate(&hot, start + TEMPERATURE_ALERT_INTERVAL);
        assert!(matches!(later[..], [Alert::HighTemperature { .. }]));
    }

    #[test]
    fn test_low_and_high_limited_independently() {
        let mut policy = policy();
        let now = Instant::now();

        let high = policy.evaluate(&frame((36.0, 2.5), 90.0), now);
        let low = policy.evaluate(&frame((34.0, 2.0), 90.0), now);

        assert!(matches!(high[..], [Alert::HighTemperature { threshold, .. }] if threshold == 38.0));
        assert!(matches!(low[..], [Alert::LowTemperature { threshold, .. }] if threshold == 37.0));
    }

    #[test]
    fn test_zero_core_never_alerts() {
        let mut policy = policy();
        assert!(policy.evaluate(&frame((0.0, 0.0), 90.0), Instant::now()).is_empty());
    }

    #[test]
    fn test_reset_clears_rate_limit() {
        let mut policy = policy();
        let now = Instant::now();
        let hot = frame((36.0, 2.5), 90.0);

        policy.evaluate(&hot, now);
        policy.reset();
        assert_eq!(policy.evaluate(&hot, now).len(), 1);
    }

    #[test]
    fn test_battery_alerts_on_crossing() {
        let mut policy = policy();
        let now = Instant::now();
        let ok = (33.0, 4.5);

        assert!(policy.evaluate(&frame(ok, 50.0), now).is_empty());
        assert_eq!(
            policy.evaluate(&frame(ok, 30.0), now),
            vec![Alert::BatteryLow { level: 30.0 }]
        );
        assert!(policy.evaluate(&frame(ok, 25.0), now).is_empty());
        assert_eq!(
            policy.evaluate(&frame(ok, 15.0), now),
            vec![Alert::BatteryCritical { level: 15.0 }]
        );
        assert!(policy.evaluate(&frame(ok, 10.0), now).is_empty());

        // Recharge and drain again.
        assert!(policy.evaluate(&frame(ok, 80.0), now).is_empty());
        assert_eq!(
            policy.evaluate(&frame(ok, 29.0), now),
            vec![Alert::BatteryLow { level: 29.0 }]
        );
    }

    #[test]
    fn test_first_frame_already_critical() {
        let mut policy = policy();
        assert_eq!(
            policy.evaluate(&frame((33.0, 4.5), 12.0), Instant::now()),
            vec![Alert::BatteryCritical { level: 12.0 }]
        );
    }

    #[test]
    fn test_disabled_policy_is_silent() {
        let mut policy = policy().with_enabled(false);
        assert!(
            policy
                .evaluate(&frame((36.0, 2.5), 5.0), Instant::now())
                .is_empty()
        );
    }

    #[test]
    fn test_alert_messages() {
        let alert = Alert::HighTemperature {
            current: 38.46,
            threshold: 38.0,
        };
        assert_eq!(
            alert.message(),
            "Core temperature is 38.5°C, exceeding the threshold of 38.0°C."
        );
        assert_eq!(
            Alert::BatteryLow { level: 28.0 }.message(),
            "Battery level is at 28%. Please charge soon."
        );
    }

    #[test]
    fn test_tracing_gateway_writes_json_lines() {
        let mut gateway = TracingGateway::with_json_writer(Vec::new());
        let at = OffsetDateTime::from_unix_timestamp(2).unwrap();
        gateway.publish(&MirrorRecord::new(None, 0.0, LinkFlags::default(), at));
        gateway.alert(&Alert::BatteryCritical { level: 9.0 });

        let output = String::from_utf8(gateway.into_writer().unwrap()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"timestamp\":2000"));
        assert!(lines[1].contains("\"type\":\"battery_critical\""));
    }

    #[derive(Clone, Default)]
    struct CapturedLog(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_mirror_updates_stay_below_info() {
        let log = CapturedLog::default();
        let sink = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish();

        let mut gateway = TracingGateway::new();
        let at = OffsetDateTime::from_unix_timestamp(2).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            gateway.publish(&MirrorRecord::new(None, 0.0, LinkFlags::default(), at));
            gateway.alert(&Alert::BatteryCritical { level: 9.0 });
        });

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(!output.contains("Mirror update"));
        assert!(output.contains("WARN"));
    }
}
