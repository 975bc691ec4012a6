//! Session file names.
//!
//! The store has no index: the date, sport and session id of every log live
//! in its file name, `temp_<yyyy-MM-dd>_<sport>_session_<id>.csv`. Files
//! written before sports existed lack the sport segment
//! (`temp_<yyyy-MM-dd>_session_<id>.csv`) and count as running sessions.

use std::fmt;

use time::Date;
use time::macros::format_description;

use innertemp_types::{SessionInfo, Sport};

/// Prefix of every session file.
pub const FILE_PREFIX: &str = "temp_";

/// Extension of every session file.
pub const FILE_EXTENSION: &str = ".csv";

const SESSION_MARKER: &str = "session_";

/// Format a date the way it appears in file names.
pub fn date_segment(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Prefix shared by every session file of one month, `temp_<yyyy>-<MM>-`.
pub fn month_prefix(year: i32, month: u8) -> String {
    format!("{FILE_PREFIX}{year:04}-{month:02}-")
}

/// A parsed session file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFileName {
    /// Day the entries were logged.
    pub date: Date,
    /// Sport segment, `None` for legacy names.
    pub sport: Option<Sport>,
    /// Session identifier.
    pub session_id: String,
}

impl SessionFileName {
    pub fn new(date: Date, sport: Sport, session_id: impl Into<String>) -> Self {
        Self {
            date,
            sport: Some(sport),
            session_id: session_id.into(),
        }
    }

    /// Parse a file name, returning `None` for anything that is not a
    /// session file or names an unknown sport.
    ///
    /// ```
    /// use innertemp_store::SessionFileName;
    /// use innertemp_types::Sport;
    ///
    /// let name = SessionFileName::parse("temp_2024-03-17_cycling_session_20240317_081500.csv").unwrap();
    /// assert_eq!(name.sport, Some(Sport::Cycling));
    /// assert_eq!(name.session_id, "20240317_081500");
    ///
    /// let legacy = SessionFileName::parse("temp_2024-03-17_session_20240317_081500.csv").unwrap();
    /// assert_eq!(legacy.sport, None);
    /// ```
    pub fn parse(name: &str) -> Option<Self> {
        let stem = name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_EXTENSION)?;
        let (date, rest) = stem.split_at_checked(10)?;
        let date = Date::parse(date, format_description!("[year]-[month]-[day]")).ok()?;
        let rest = rest.strip_prefix('_')?;

        let (sport, session_id) = match rest.strip_prefix(SESSION_MARKER) {
            Some(id) => (None, id),
            None => {
                let (segment, id) = rest.split_once("_session_")?;
                (Some(segment.parse::<Sport>().ok()?), id)
            }
        };
        if session_id.is_empty() {
            return None;
        }

        Some(Self {
            date,
            sport,
            session_id: session_id.to_string(),
        })
    }

    /// Sport of the session, legacy names counting as running.
    pub fn sport_or_default(&self) -> Sport {
        self.sport.unwrap_or_default()
    }

    /// Whether the name carries `sport` as its sport segment.
    ///
    /// Legacy names carry no segment and never match.
    pub fn is_tagged(&self, sport: Sport) -> bool {
        self.sport == Some(sport)
    }

    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            id: self.session_id.clone(),
            sport: self.sport_or_default(),
        }
    }
}

impl fmt::Display for SessionFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{FILE_PREFIX}{}_", date_segment(self.date))?;
        if let Some(sport) = self.sport {
            write!(f, "{}_", sport.file_segment())?;
        }
        write!(f, "{SESSION_MARKER}{}{FILE_EXTENSION}", self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn test_display_new_format() {
        let name = SessionFileName::new(date!(2024 - 03 - 07), Sport::Kayaking, "20240307_101500");
        assert_eq!(
            name.to_string(),
            "temp_2024-03-07_kayaking_session_20240307_101500.csv"
        );
    }

    #[test]
    fn test_parse_round_trip() {
        let name = SessionFileName::new(date!(2024 - 12 - 31), Sport::Running, "20241231_235959");
        assert_eq!(SessionFileName::parse(&name.to_string()), Some(name));
    }

    #[test]
    fn test_parse_legacy() {
        let name = SessionFileName::parse("temp_2023-01-02_session_20230102_070000.csv").unwrap();
        assert_eq!(name.date, date!(2023 - 01 - 02));
        assert_eq!(name.sport, None);
        assert_eq!(name.sport_or_default(), Sport::Running);
        assert!(!name.is_tagged(Sport::Running));
        assert_eq!(name.to_string(), "temp_2023-01-02_session_20230102_070000.csv");
    }

    #[test]
    fn test_parse_rejects_foreign_files() {
        for name in [
            "notes.txt",
            "temp_2024-03-17_running_session_1.txt",
            "temp_2024-3-17_running_session_1.csv",
            "temp_2024-02-30_running_session_1.csv",
            "temp_2024-03-17_swimming_session_1.csv",
            "temp_2024-03-17_running_session_.csv",
            "temp_2024-03-17_running.csv",
        ] {
            assert_eq!(SessionFileName::parse(name), None, "{name}");
        }
    }

    #[test]
    fn test_session_info() {
        let name = SessionFileName::parse("temp_2024-03-17_cycling_session_abc.csv").unwrap();
        assert_eq!(
            name.session_info(),
            SessionInfo {
                id: "abc".into(),
                sport: Sport::Cycling
            }
        );
    }

    #[test]
    fn test_month_prefix() {
        assert_eq!(month_prefix(2024, 3), "temp_2024-03-");
    }
}
