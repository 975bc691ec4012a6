//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use innertemp_core::{AlertPolicy, DriverConfig};
use innertemp_types::{ActivityMode, AthleticLevel, CustomBounds, Sport, ThresholdRange};

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the session files
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Scan duration in seconds
    #[serde(default = "default_scan_duration")]
    pub scan_duration: u64,

    /// Signal strength polling interval in seconds
    #[serde(default = "default_rssi_interval")]
    pub rssi_interval: u64,

    /// Sport new sessions are tagged with
    #[serde(default)]
    pub sport: Sport,

    /// Raise temperature and battery alerts while monitoring
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,

    /// Print mirror records as JSON lines while monitoring
    #[serde(default)]
    pub mirror_json: bool,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,

    /// Alert thresholds
    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

/// Athlete profile the alert range is derived from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// "training", "race" or "custom"
    #[serde(default)]
    pub mode: ActivityMode,

    /// "low", "medium" or "high"
    #[serde(default)]
    pub level: Option<AthleticLevel>,

    /// Lower bound in °C for custom mode
    #[serde(default)]
    pub custom_low: Option<f64>,

    /// Upper bound in °C for custom mode
    #[serde(default)]
    pub custom_high: Option<f64>,
}

impl ThresholdConfig {
    pub fn range(&self) -> ThresholdRange {
        let custom = match (self.custom_low, self.custom_high) {
            (Some(low), Some(high)) => Some(CustomBounds { low, high }),
            _ => None,
        };
        ThresholdRange::for_profile(self.mode, self.level, custom)
    }
}

fn default_scan_duration() -> u64 {
    10
}

fn default_rssi_interval() -> u64 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            scan_duration: default_scan_duration(),
            rssi_interval: default_rssi_interval(),
            sport: Sport::default(),
            notifications_enabled: true,
            mirror_json: false,
            no_color: false,
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("innertemp")
            .join("config.toml")
    }

    /// Load config from the default path, or return default if not found
    pub fn load() -> Self {
        Self::load_from(&Self::path())
    }

    /// Load config from `path`, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to parse config"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to read config"),
            }
        }
        Self::default()
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Session file directory: flag, then config, then the platform default.
    pub fn resolve_data_dir(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.data_dir.clone())
            .unwrap_or_else(innertemp_store::default_data_dir)
    }

    /// Driver settings, with optional overrides in seconds.
    pub fn driver_config(&self, scan_secs: Option<u64>, rssi_secs: Option<u64>) -> DriverConfig {
        DriverConfig::default()
            .scan_duration(Duration::from_secs(scan_secs.unwrap_or(self.scan_duration)))
            .rssi_interval(Duration::from_secs(rssi_secs.unwrap_or(self.rssi_interval)))
    }

    /// Alert policy for the configured profile.
    pub fn alert_policy(&self, thresholds: &ThresholdConfig, no_alerts: bool) -> AlertPolicy {
        AlertPolicy::new(thresholds.range()).with_enabled(self.notifications_enabled && !no_alerts)
    }
}
