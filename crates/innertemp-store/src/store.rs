//! Session log implementation.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use time::{Date, Month, OffsetDateTime};
use tracing::{debug, info, warn};

use innertemp_types::{SessionInfo, Sport, TemperatureEntry, TemperatureStats};

use crate::error::{Error, Result};
use crate::naming::{self, SessionFileName};

/// Header row of every session file.
pub const HEADER: [&str; 3] = ["time", "temperature", "sport"];

/// Current local time, falling back to UTC when the offset is unknown.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| {
        debug!("Local offset unavailable, using UTC");
        OffsetDateTime::now_utc()
    })
}

/// Session id for a session started at `at`, `yyyyMMdd_HHmmss`.
///
/// Two sessions started within the same second share an id and therefore
/// a file.
pub fn session_id_at(at: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

fn time_of_day(at: OffsetDateTime) -> String {
    format!("{:02}:{:02}:{:02}", at.hour(), at.minute(), at.second())
}

fn calendar_date(year: i32, month: u8, day: u8) -> Result<Date> {
    let month = Month::try_from(month).map_err(|_| Error::InvalidDate(format!("month {month}")))?;
    Date::from_calendar_date(year, month, day)
        .map_err(|_| Error::InvalidDate(format!("{year:04}-{:02}-{day:02}", u8::from(month))))
}

/// File-backed temperature log, one CSV file per (date, sport, session).
///
/// Appends are flushed and synced before [`SessionLog::try_log_temperature_at`]
/// returns. Queries never fail: unreadable files count as empty and
/// malformed rows are skipped.
#[derive(Debug)]
pub struct SessionLog {
    dir: PathBuf,
    session_id: String,
    sport: Sport,
}

impl SessionLog {
    /// Open a log in `dir`, creating the directory if needed.
    ///
    /// A first session for [`Sport::Running`] starts immediately.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| Error::CreateDirectory {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        Ok(Self::open_existing(dir))
    }

    /// Open a log in `dir` for queries, leaving the filesystem untouched.
    ///
    /// A missing directory answers every query with "no data".
    pub fn open_existing<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        info!("Opening session log at {}", dir.display());
        Self {
            dir: dir.to_path_buf(),
            session_id: session_id_at(local_now()),
            sport: Sport::default(),
        }
    }

    /// Open the default data directory.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_data_dir())
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    /// The session new entries go to.
    pub fn current_session(&self) -> SessionInfo {
        SessionInfo {
            id: self.session_id.clone(),
            sport: self.sport,
        }
    }

    /// Start a new session for `sport` now.
    pub fn start_new_session(&mut self, sport: Sport) -> SessionInfo {
        self.start_new_session_at(sport, local_now())
    }

    /// Start a new session for `sport` with the id of `at`.
    pub fn start_new_session_at(&mut self, sport: Sport, at: OffsetDateTime) -> SessionInfo {
        self.session_id = session_id_at(at);
        self.sport = sport;
        debug!(session = %self.session_id, sport = %sport, "Started new session");
        self.current_session()
    }

    /// Append a core temperature to the current session, logging failures.
    pub fn log_temperature(&self, core_temperature: f64) {
        if let Err(e) = self.try_log_temperature_at(core_temperature, local_now()) {
            warn!(error = %e, temperature = core_temperature, "Failed to log temperature");
        }
    }

    /// Append a core temperature recorded at `at` to the current session.
    ///
    /// The file is named after the date of `at`, so a session running past
    /// midnight continues in a new file with the same id.
    pub fn try_log_temperature_at(&self, core_temperature: f64, at: OffsetDateTime) -> Result<PathBuf> {
        let name = SessionFileName::new(at.date(), self.sport, self.session_id.as_str());
        let path = self.dir.join(name.to_string());

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        if is_new {
            writer.write_record(HEADER)?;
        }
        let time = time_of_day(at);
        let temperature = format!("{core_temperature:?}");
        writer.write_record([time.as_str(), temperature.as_str(), self.sport.name()])?;
        writer.flush()?;
        writer.get_ref().sync_data()?;

        debug!(
            temperature = core_temperature,
            time = %time,
            session = %self.session_id,
            sport = %self.sport,
            "Logged temperature"
        );
        Ok(path)
    }

    /// Entries of one session file, or `None` if it is missing or unreadable.
    ///
    /// Rows without a sport column take `sport`.
    pub fn temperature_data_for_session(
        &self,
        date: Date,
        session_id: &str,
        sport: Sport,
    ) -> Option<Vec<TemperatureEntry>> {
        let name = SessionFileName::new(date, sport, session_id);
        let path = self.dir.join(name.to_string());
        match read_entries(&path, sport) {
            Ok(entries) => Some(entries),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Session file unavailable");
                None
            }
        }
    }

    /// Entries of every session on one day, optionally for one sport.
    ///
    /// Files are read in file-name order. Returns `None` when no file
    /// matched or all matching files were empty.
    pub fn temperature_data_for_date(
        &self,
        year: i32,
        month: u8,
        day: u8,
        sport: Option<Sport>,
    ) -> Option<Vec<TemperatureEntry>> {
        let date = match calendar_date(year, month, day) {
            Ok(date) => date,
            Err(e) => {
                warn!(error = %e, "Ignoring query");
                return None;
            }
        };

        let files: Vec<_> = self
            .session_files()?
            .into_iter()
            .filter(|name| name.date == date && sport.is_none_or(|s| name.is_tagged(s)))
            .collect();
        debug!(
            date = %naming::date_segment(date),
            sport = ?sport,
            files = files.len(),
            "Found session files"
        );

        let mut entries = Vec::new();
        for name in &files {
            let path = self.dir.join(name.to_string());
            match read_entries(&path, name.sport_or_default()) {
                Ok(mut file_entries) => entries.append(&mut file_entries),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable file"),
            }
        }

        (!entries.is_empty()).then_some(entries)
    }

    /// Lowest, highest and mean temperature of one day.
    pub fn temperature_stats_for_date(
        &self,
        year: i32,
        month: u8,
        day: u8,
        sport: Option<Sport>,
    ) -> Option<TemperatureStats> {
        let entries = self.temperature_data_for_date(year, month, day, sport)?;
        TemperatureStats::from_entries(&entries, sport)
    }

    /// Days of a month that have at least one session file.
    pub fn days_with_data_in_month(&self, year: i32, month: u8, sport: Option<Sport>) -> BTreeSet<u8> {
        let prefix = naming::month_prefix(year, month);
        let days: BTreeSet<u8> = self
            .session_file_names()
            .unwrap_or_default()
            .iter()
            .filter(|file_name| file_name.starts_with(&prefix))
            .filter_map(|file_name| SessionFileName::parse(file_name))
            .filter(|name| sport.is_none_or(|s| name.is_tagged(s)))
            .map(|name| name.date.day())
            .collect();

        debug!(year, month, sport = ?sport, days = days.len(), "Found days with data");
        days
    }

    /// Sessions recorded on one day.
    ///
    /// Legacy files count as running sessions.
    pub fn sessions_for_date(
        &self,
        year: i32,
        month: u8,
        day: u8,
        sport: Option<Sport>,
    ) -> Vec<SessionInfo> {
        let Ok(date) = calendar_date(year, month, day) else {
            return Vec::new();
        };

        let sessions: Vec<_> = self
            .session_files()
            .unwrap_or_default()
            .into_iter()
            .filter(|name| name.date == date)
            .map(|name| name.session_info())
            .filter(|info| sport.is_none_or(|s| info.sport == s))
            .collect();

        debug!(date = %naming::date_segment(date), sessions = sessions.len(), "Found sessions");
        sessions
    }

    /// Distinct sports recorded on one day, in declaration order.
    pub fn sports_for_date(&self, year: i32, month: u8, day: u8) -> Vec<Sport> {
        let Ok(date) = calendar_date(year, month, day) else {
            return Vec::new();
        };

        self.session_files()
            .unwrap_or_default()
            .into_iter()
            .filter(|name| name.date == date)
            .map(|name| name.sport_or_default())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted names of the files in the data directory.
    fn session_file_names(&self) -> Option<Vec<String>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Cannot list data directory");
                return None;
            }
        };

        let mut names: Vec<String> = read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Some(names)
    }

    /// Parsed session files, in file-name order.
    fn session_files(&self) -> Option<Vec<SessionFileName>> {
        Some(
            self.session_file_names()?
                .iter()
                .filter_map(|file_name| {
                    let parsed = SessionFileName::parse(file_name);
                    if parsed.is_none() && file_name.starts_with(naming::FILE_PREFIX) {
                        debug!(file = %file_name, "Not a session file name");
                    }
                    parsed
                })
                .collect(),
        )
    }
}

/// Read every well-formed row of a session file.
///
/// The first line is the header. Rows need a time and a numeric
/// temperature; a missing or unknown sport takes `fallback`. Quotes carry
/// no meaning, so a stray `"` only spoils its own row.
fn read_entries(path: &Path, fallback: Sport) -> Result<Vec<TemperatureEntry>> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut entries = Vec::new();
    for record in reader.records() {
        let parsed = record
            .map_err(Error::from)
            .and_then(|record| parse_row(&record, fallback));
        match parsed {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping row"),
        }
    }
    Ok(entries)
}

fn parse_row(record: &csv::StringRecord, fallback: Sport) -> Result<TemperatureEntry> {
    let line = record.position().map_or(0, |p| p.line());
    let (Some(time), Some(temperature)) = (record.get(0), record.get(1)) else {
        return Err(Error::malformed(line, "expected time and temperature"));
    };
    let temperature: f64 = temperature
        .parse()
        .map_err(|_| Error::malformed(line, format!("temperature {temperature:?} is not a number")))?;
    let sport = record
        .get(2)
        .and_then(|sport| sport.parse().ok())
        .unwrap_or(fallback);
    Ok(TemperatureEntry::new(time, temperature, sport))
}
