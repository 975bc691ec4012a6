//! Colored value formatting for terminal output.

use owo_colors::OwoColorize;

use innertemp_core::ConnectionQuality;
use innertemp_types::TemperatureColor;

/// Battery level below which the value shows red.
const BATTERY_LOW: f64 = 15.0;
/// Battery level below which the value shows yellow.
const BATTERY_MEDIUM: f64 = 30.0;

/// Format a core temperature colored by its classification.
pub fn format_temp_colored(celsius: f64, no_color: bool) -> String {
    let formatted = format!("{:.2}", celsius);
    if no_color {
        return formatted;
    }

    match TemperatureColor::for_temperature(celsius) {
        TemperatureColor::Cool => format!("{}", formatted.cyan()),
        TemperatureColor::Normal => format!("{}", formatted.green()),
        // Orange color (RGB: 255, 165, 0)
        TemperatureColor::Hot => format!("{}", formatted.truecolor(255, 165, 0)),
    }
}

/// Format battery percentage with appropriate color.
pub fn format_battery_colored(percent: f64, no_color: bool) -> String {
    let formatted = format!("{:.0}%", percent);
    if no_color {
        return formatted;
    }

    if percent < BATTERY_LOW {
        format!("{}", formatted.red())
    } else if percent < BATTERY_MEDIUM {
        format!("{}", formatted.yellow())
    } else {
        format!("{}", formatted.green())
    }
}

/// Format RSSI as a visual signal bar.
pub fn format_signal_bar(rssi: Option<i16>, no_color: bool) -> String {
    let Some(rssi) = rssi else {
        return "----".to_string();
    };

    let quality = ConnectionQuality::from_rssi(Some(rssi));
    let bar = match quality {
        ConnectionQuality::Good => "▂▄▆█",
        ConnectionQuality::Medium => "▂▄▆_",
        _ => "▂___",
    };
    let formatted = format!("{bar} {rssi} dBm");
    if no_color {
        return formatted;
    }

    match quality {
        ConnectionQuality::Good => format!("{}", formatted.green()),
        ConnectionQuality::Medium => format!("{}", formatted.yellow()),
        _ => format!("{}", formatted.red()),
    }
}

/// Format an informational status line.
pub fn format_info(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[i] {}", message)
    } else {
        format!("{} {}", "[i]".blue(), message)
    }
}

/// Format a warning line.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!] {}", message)
    } else {
        format!("{} {}", "[!]".yellow(), message.yellow())
    }
}

/// Format a title line.
pub fn format_title(title: &str, no_color: bool) -> String {
    if no_color {
        title.to_string()
    } else {
        format!("{}", title.bold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_color_temperature() {
        assert_eq!(format_temp_colored(36.456, true), "36.46");
    }

    #[test]
    fn test_colored_temperature_contains_value() {
        let hot = format_temp_colored(38.5, false);
        assert!(hot.contains("38.50"));
        assert_ne!(hot, "38.50");
    }

    #[test]
    fn test_battery_plain() {
        assert_eq!(format_battery_colored(87.5, true), "88%");
    }

    #[test]
    fn test_signal_bar() {
        assert_eq!(format_signal_bar(None, true), "----");
        assert_eq!(format_signal_bar(Some(-50), true), "▂▄▆█ -50 dBm");
        assert_eq!(format_signal_bar(Some(-70), true), "▂▄▆_ -70 dBm");
        assert_eq!(format_signal_bar(Some(-90), true), "▂___ -90 dBm");
    }
}
