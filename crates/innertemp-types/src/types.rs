//! Core types for InnerTemp sensor data.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, DecodeResult, UnknownSport};

/// Number of bytes in one sensor notification.
pub const FRAME_LEN: usize = 12;

/// Round `value` to `decimals` places, halves away from zero.
///
/// This matches fixed-point string formatting of the reading, which is how
/// values are displayed and persisted.
///
/// ```
/// use innertemp_types::round_to;
///
/// assert_eq!(round_to(36.456, 2), 36.46);
/// assert_eq!(round_to(-0.125, 2), -0.13);
/// assert_eq!(round_to(37.25, 1), 37.3);
/// ```
#[must_use]
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// One decoded notification from the sensor.
///
/// All values are rounded to two decimal places. `core_temperature` is
/// derived from the two rounded temperatures and rounded again.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorFrame {
    /// Skin-side temperature in °C.
    pub skin_temperature: f64,
    /// Outside (insulated side) temperature in °C.
    pub outside_temperature: f64,
    /// Battery level, 0-100.
    pub battery_level: f64,
    /// Estimated core temperature in °C.
    pub core_temperature: f64,
}

impl SensorFrame {
    /// Decode a frame from a raw notification payload.
    ///
    /// The byte format is:
    /// - bytes 0-3: skin temperature (f32 LE)
    /// - bytes 4-7: outside temperature (f32 LE)
    /// - bytes 8-11: battery level (f32 LE)
    ///
    /// Trailing bytes are ignored. There is no checksum and no sequence
    /// number.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InsufficientData`] if `data` holds fewer than
    /// [`FRAME_LEN`] bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use innertemp_types::SensorFrame;
    ///
    /// let mut bytes = Vec::new();
    /// bytes.extend_from_slice(&33.5f32.to_le_bytes());
    /// bytes.extend_from_slice(&3.25f32.to_le_bytes());
    /// bytes.extend_from_slice(&80.0f32.to_le_bytes());
    ///
    /// let frame = SensorFrame::decode(&bytes).unwrap();
    /// assert_eq!(frame.core_temperature, 36.75);
    /// assert_eq!(frame.battery_level, 80.0);
    /// ```
    #[must_use = "decoding returns a Result that should be handled"]
    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        use bytes::Buf;

        if data.len() < FRAME_LEN {
            return Err(DecodeError::InsufficientData {
                expected: FRAME_LEN,
                actual: data.len(),
            });
        }

        let mut buf = data;
        let skin = f64::from(buf.get_f32_le());
        let outside = f64::from(buf.get_f32_le());
        let battery = f64::from(buf.get_f32_le());

        Ok(Self::from_raw(skin, outside, battery))
    }

    /// Build a frame from unrounded values, applying the frame's rounding
    /// rules.
    #[must_use]
    pub fn from_raw(skin: f64, outside: f64, battery: f64) -> Self {
        let skin_temperature = round_to(skin, 2);
        let outside_temperature = round_to(outside, 2);
        Self {
            skin_temperature,
            outside_temperature,
            battery_level: round_to(battery, 2),
            core_temperature: round_to(skin_temperature + outside_temperature, 2),
        }
    }

    /// Check that every field holds a finite number.
    ///
    /// A payload of garbage bytes still decodes (any 32-bit pattern is a
    /// float), but NaN and infinities must not reach consumers.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] naming the first non-finite field.
    pub fn ensure_finite(&self) -> DecodeResult<()> {
        let fields = [
            ("skin_temperature", self.skin_temperature),
            ("outside_temperature", self.outside_temperature),
            ("battery_level", self.battery_level),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(DecodeError::Malformed {
                    field,
                    reason: format!("non-finite value {value}"),
                });
            }
        }
        Ok(())
    }
}

impl TryFrom<&[u8]> for SensorFrame {
    type Error = DecodeError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        Self::decode(data)
    }
}

/// Sport a logging session is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Sport {
    /// Running (the default).
    #[default]
    Running,
    /// Cycling.
    Cycling,
    /// Kayaking.
    Kayaking,
}

impl Sport {
    /// All sports in declaration order.
    pub const ALL: [Sport; 3] = [Sport::Running, Sport::Cycling, Sport::Kayaking];

    /// Upper-case name as written in session file rows.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Sport::Running => "RUNNING",
            Sport::Cycling => "CYCLING",
            Sport::Kayaking => "KAYAKING",
        }
    }

    /// Lower-case name as written in session file names.
    #[must_use]
    pub fn file_segment(&self) -> &'static str {
        match self {
            Sport::Running => "running",
            Sport::Cycling => "cycling",
            Sport::Kayaking => "kayaking",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sport {
    type Err = UnknownSport;

    /// Parse a sport name, ignoring ASCII case and surrounding whitespace.
    ///
    /// ```
    /// use innertemp_types::Sport;
    ///
    /// assert_eq!("RUNNING".parse::<Sport>(), Ok(Sport::Running));
    /// assert_eq!("kayaking".parse::<Sport>(), Ok(Sport::Kayaking));
    /// assert!("swimming".parse::<Sport>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Sport::ALL
            .into_iter()
            .find(|sport| sport.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownSport(trimmed.to_string()))
    }
}

/// A persisted temperature sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemperatureEntry {
    /// Time of day, `HH:MM:SS`.
    pub time: String,
    /// Core temperature in °C.
    pub temperature: f64,
    /// Sport of the session the entry belongs to.
    pub sport: Sport,
}

impl TemperatureEntry {
    /// Create a new entry.
    pub fn new(time: impl Into<String>, temperature: f64, sport: Sport) -> Self {
        Self {
            time: time.into(),
            temperature,
            sport,
        }
    }
}

/// Summary statistics over a set of entries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemperatureStats {
    /// Lowest temperature seen.
    pub lowest: f64,
    /// Highest temperature seen.
    pub highest: f64,
    /// Arithmetic mean (unrounded).
    pub average: f64,
    /// Number of entries.
    pub count: usize,
    /// Sport filter the statistics were computed with, if any.
    pub sport: Option<Sport>,
}

impl TemperatureStats {
    /// Compute statistics over `entries`, or `None` if there are none.
    #[must_use]
    pub fn from_entries(entries: &[TemperatureEntry], sport: Option<Sport>) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }

        let (lowest, highest, sum) = entries.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(lo, hi, sum), entry| {
                (
                    lo.min(entry.temperature),
                    hi.max(entry.temperature),
                    sum + entry.temperature,
                )
            },
        );

        Some(Self {
            lowest,
            highest,
            average: sum / entries.len() as f64,
            count: entries.len(),
            sport,
        })
    }
}

/// A logging session found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionInfo {
    /// Session identifier (`yyyyMMdd_HHmmss` of the session start).
    pub id: String,
    /// Sport the session was recorded for.
    pub sport: Sport,
}

/// Destination for accepted core temperatures.
///
/// Implementations must not block the caller: they are invoked from the
/// connection event loop.
pub trait SessionSink: Send {
    /// End the current session and begin a new one for `sport`.
    fn start_new_session(&self, sport: Sport);

    /// Record one core temperature in the current session.
    fn log_temperature(&self, core_temperature: f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(skin: f32, outside: f32, battery: f32) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_LEN);
        bytes.extend_from_slice(&skin.to_le_bytes());
        bytes.extend_from_slice(&outside.to_le_bytes());
        bytes.extend_from_slice(&battery.to_le_bytes());
        bytes
    }

    // --- SensorFrame decoding ---

    #[test]
    fn test_decode_exact_values() {
        let frame = SensorFrame::decode(&frame_bytes(33.5, 3.25, 80.0)).unwrap();

        assert_eq!(frame.skin_temperature, 33.5);
        assert_eq!(frame.outside_temperature, 3.25);
        assert_eq!(frame.battery_level, 80.0);
        assert_eq!(frame.core_temperature, 36.75);
    }

    #[test]
    fn test_decode_rounds_each_field_before_summing() {
        let frame = SensorFrame::decode(&frame_bytes(22.335, 14.115, 87.5)).unwrap();

        let expected_core = round_to(frame.skin_temperature + frame.outside_temperature, 2);
        assert_eq!(frame.core_temperature, expected_core);
        assert!((frame.core_temperature - 36.45).abs() <= 0.011);
        assert_eq!(frame.battery_level, 87.5);
    }

    #[test]
    fn test_decode_insufficient_bytes() {
        let result = SensorFrame::decode(&[0u8; 11]);

        assert_eq!(
            result,
            Err(DecodeError::InsufficientData {
                expected: 12,
                actual: 11
            })
        );
        let err = SensorFrame::decode(&[]).unwrap_err();
        assert!(err.to_string().contains("requires 12 bytes, got 0"));
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = frame_bytes(30.0, 6.5, 55.0);
        let plain = SensorFrame::decode(&bytes).unwrap();
        bytes.extend_from_slice(&[0xFF, 0x00, 0x7F, 0x80]);

        assert_eq!(SensorFrame::decode(&bytes).unwrap(), plain);
    }

    #[test]
    fn test_try_from_slice() {
        let bytes = frame_bytes(1.0, 2.0, 3.0);
        let frame = SensorFrame::try_from(bytes.as_slice()).unwrap();
        assert_eq!(frame.core_temperature, 3.0);
    }

    #[test]
    fn test_ensure_finite_rejects_nan() {
        let frame = SensorFrame::decode(&frame_bytes(f32::NAN, 1.0, 50.0)).unwrap();

        match frame.ensure_finite() {
            Err(DecodeError::Malformed { field, .. }) => assert_eq!(field, "skin_temperature"),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_finite_rejects_infinite_battery() {
        let frame = SensorFrame::decode(&frame_bytes(30.0, 6.0, f32::INFINITY)).unwrap();

        match frame.ensure_finite() {
            Err(DecodeError::Malformed { field, .. }) => assert_eq!(field, "battery_level"),
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_ensure_finite_accepts_normal_frame() {
        let frame = SensorFrame::decode(&frame_bytes(30.0, 6.0, 99.0)).unwrap();
        assert!(frame.ensure_finite().is_ok());
    }

    // --- Rounding ---

    #[test]
    fn test_round_to_half_away_from_zero() {
        assert_eq!(round_to(0.125, 2), 0.13);
        assert_eq!(round_to(-0.125, 2), -0.13);
        assert_eq!(round_to(36.04, 1), 36.0);
        assert_eq!(round_to(36.05, 0), 36.0);
    }

    // --- Sport ---

    #[test]
    fn test_sport_default_is_running() {
        assert_eq!(Sport::default(), Sport::Running);
    }

    #[test]
    fn test_sport_names() {
        assert_eq!(Sport::Cycling.name(), "CYCLING");
        assert_eq!(Sport::Cycling.file_segment(), "cycling");
        assert_eq!(Sport::Kayaking.to_string(), "KAYAKING");
    }

    #[test]
    fn test_sport_parse() {
        assert_eq!(" Cycling ".parse::<Sport>(), Ok(Sport::Cycling));
        assert_eq!("running".parse::<Sport>(), Ok(Sport::Running));
        assert_eq!(
            "rowing".parse::<Sport>(),
            Err(UnknownSport("rowing".to_string()))
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_sport_serde_uses_upper_case() {
        let json = serde_json::to_string(&Sport::Kayaking).unwrap();
        assert_eq!(json, "\"KAYAKING\"");

        let parsed: Sport = serde_json::from_str("\"CYCLING\"").unwrap();
        assert_eq!(parsed, Sport::Cycling);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_frame_serializes_all_fields() {
        let frame = SensorFrame::from_raw(33.0, 3.5, 70.0);
        let json = serde_json::to_value(frame).unwrap();

        assert_eq!(json["core_temperature"], 36.5);
        assert_eq!(json["battery_level"], 70.0);
    }

    // --- Statistics ---

    #[test]
    fn test_stats_over_entries() {
        let entries = vec![
            TemperatureEntry::new("10:00:00", 36.5, Sport::Running),
            TemperatureEntry::new("10:00:01", 37.5, Sport::Running),
            TemperatureEntry::new("10:00:02", 38.5, Sport::Running),
        ];

        let stats = TemperatureStats::from_entries(&entries, Some(Sport::Running)).unwrap();

        assert_eq!(stats.lowest, 36.5);
        assert_eq!(stats.highest, 38.5);
        assert!((stats.average - 37.5).abs() < 1e-9);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.sport, Some(Sport::Running));
    }

    #[test]
    fn test_stats_empty_is_none() {
        assert!(TemperatureStats::from_entries(&[], None).is_none());
    }
}

/// Property-based tests for frame decoding.
///
/// ```bash
/// cargo test -p innertemp-types types::proptests
/// ```
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Decoding arbitrary bytes never panics.
        #[test]
        fn decode_never_panics(data: Vec<u8>) {
            let _ = SensorFrame::decode(&data);
        }

        /// Short buffers always report how many bytes were seen.
        #[test]
        fn decode_short_buffer_fails(data in proptest::collection::vec(any::<u8>(), 0..FRAME_LEN)) {
            let len = data.len();
            prop_assert_eq!(
                SensorFrame::decode(&data),
                Err(DecodeError::InsufficientData { expected: FRAME_LEN, actual: len })
            );
        }

        /// Any buffer of at least 12 bytes decodes.
        #[test]
        fn decode_full_buffer_succeeds(data in proptest::collection::vec(any::<u8>(), FRAME_LEN..64)) {
            prop_assert!(SensorFrame::decode(&data).is_ok());
        }

        /// Decoded values are within half a hundredth of the encoded ones.
        #[test]
        fn decode_preserves_values(
            skin in -50.0f32..60.0,
            outside in -50.0f32..60.0,
            battery in 0.0f32..100.0,
        ) {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(&skin.to_le_bytes());
            bytes.extend_from_slice(&outside.to_le_bytes());
            bytes.extend_from_slice(&battery.to_le_bytes());

            let frame = SensorFrame::decode(&bytes).unwrap();
            prop_assert!((frame.skin_temperature - f64::from(skin)).abs() <= 0.0051);
            prop_assert!((frame.outside_temperature - f64::from(outside)).abs() <= 0.0051);
            prop_assert!((frame.battery_level - f64::from(battery)).abs() <= 0.0051);
            prop_assert_eq!(
                frame.core_temperature,
                round_to(frame.skin_temperature + frame.outside_temperature, 2)
            );
        }

        /// Rounding to two decimals is idempotent.
        #[test]
        fn round_to_is_idempotent(value in -1000.0f64..1000.0) {
            let once = round_to(value, 2);
            prop_assert_eq!(round_to(once, 2), once);
        }
    }
}
