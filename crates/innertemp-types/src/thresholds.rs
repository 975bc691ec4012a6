//! Core temperature classification.
//!
//! Two layers are provided: a fixed three-band [`TemperatureColor`] used for
//! the running average, and a per-athlete [`ThresholdRange`] selected from
//! the activity mode and athletic level.
//!
//! # Example
//!
//! ```
//! use innertemp_types::{ActivityMode, AthleticLevel, TemperatureColor, ThresholdRange};
//!
//! assert_eq!(TemperatureColor::for_temperature(38.4), TemperatureColor::Hot);
//!
//! let range = ThresholdRange::for_profile(ActivityMode::Race, Some(AthleticLevel::Low), None);
//! assert_eq!(range.low, 37.0);
//! assert_eq!(range.high, 37.8);
//! ```

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lower bound of the normal band for [`TemperatureColor`].
pub const COOL_BELOW: f64 = 36.0;
/// Upper bound of the normal band for [`TemperatureColor`].
pub const HOT_ABOVE: f64 = 38.0;

/// Three-band classification of a temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TemperatureColor {
    /// Below 36.0 °C.
    Cool,
    /// 36.0 °C to 38.0 °C inclusive.
    Normal,
    /// Above 38.0 °C.
    Hot,
}

impl TemperatureColor {
    /// Classify a temperature. Both band edges belong to `Normal`.
    #[must_use]
    pub fn for_temperature(value: f64) -> Self {
        if value < COOL_BELOW {
            TemperatureColor::Cool
        } else if value > HOT_ABOVE {
            TemperatureColor::Hot
        } else {
            TemperatureColor::Normal
        }
    }
}

impl fmt::Display for TemperatureColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TemperatureColor::Cool => "cool",
            TemperatureColor::Normal => "normal",
            TemperatureColor::Hot => "hot",
        };
        f.write_str(label)
    }
}

/// What the athlete is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ActivityMode {
    #[default]
    Training,
    Race,
    /// User-supplied bounds.
    Custom,
}

impl FromStr for ActivityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "training" => Ok(ActivityMode::Training),
            "race" => Ok(ActivityMode::Race),
            "custom" => Ok(ActivityMode::Custom),
            other => Err(format!("unknown activity mode: {other}")),
        }
    }
}

/// Self-reported fitness level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AthleticLevel {
    Low,
    Medium,
    High,
}

impl FromStr for AthleticLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(AthleticLevel::Low),
            "medium" => Ok(AthleticLevel::Medium),
            "high" => Ok(AthleticLevel::High),
            other => Err(format!("unknown athletic level: {other}")),
        }
    }
}

/// User-supplied bounds for [`ActivityMode::Custom`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CustomBounds {
    pub low: f64,
    pub high: f64,
}

/// Where a temperature falls relative to a [`ThresholdRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RangeStatus {
    BelowRange,
    InRange,
    AboveRange,
}

/// Acceptable core temperature band for an athlete.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdRange {
    /// Below this the athlete is too cold.
    pub low: f64,
    /// Midpoint of `low` and `high`.
    pub optimal: f64,
    /// Above this the athlete is too hot.
    pub high: f64,
}

impl ThresholdRange {
    /// Build a range from its bounds.
    #[must_use]
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            low,
            optimal: (low + high) / 2.0,
            high,
        }
    }

    /// Select the range for an athlete profile.
    ///
    /// Custom mode uses `custom` when given; without it, and for every
    /// non-race mode, the training column applies.
    ///
    /// | Level   | Race        | Training    |
    /// |---------|-------------|-------------|
    /// | Low     | 37.0 - 37.8 | 37.5 - 38.0 |
    /// | Medium  | 37.2 - 38.0 | 37.8 - 38.5 |
    /// | High    | 37.5 - 38.3 | 38.0 - 39.0 |
    /// | (unset) | 37.2 - 39.0 | 37.2 - 38.7 |
    #[must_use]
    pub fn for_profile(
        mode: ActivityMode,
        level: Option<AthleticLevel>,
        custom: Option<CustomBounds>,
    ) -> Self {
        if let (ActivityMode::Custom, Some(bounds)) = (mode, custom) {
            return Self::new(bounds.low, bounds.high);
        }

        let race = mode == ActivityMode::Race;
        let (low, high) = match (level, race) {
            (Some(AthleticLevel::Low), true) => (37.0, 37.8),
            (Some(AthleticLevel::Low), false) => (37.5, 38.0),
            (Some(AthleticLevel::Medium), true) => (37.2, 38.0),
            (Some(AthleticLevel::Medium), false) => (37.8, 38.5),
            (Some(AthleticLevel::High), true) => (37.5, 38.3),
            (Some(AthleticLevel::High), false) => (38.0, 39.0),
            (None, true) => (37.2, 39.0),
            (None, false) => (37.2, 38.7),
        };
        Self::new(low, high)
    }

    /// Classify a temperature against this range. Bounds are inclusive.
    #[must_use]
    pub fn status(&self, value: f64) -> RangeStatus {
        if value < self.low {
            RangeStatus::BelowRange
        } else if value > self.high {
            RangeStatus::AboveRange
        } else {
            RangeStatus::InRange
        }
    }
}

impl Default for ThresholdRange {
    fn default() -> Self {
        Self::new(COOL_BELOW, HOT_ABOVE)
    }
}
