//! Per-session temperature logs for the InnerTemp companion.
//!
//! Every session is a small CSV file named after its day, sport and session
//! id. There is no database: the directory listing is the index, and all
//! queries (by session, by day, per month) are answered from file names and
//! file contents.
//!
//! # Features
//!
//! - Append-only session files, synced after each entry
//! - Day queries with optional sport filter, plus statistics
//! - Calendar helpers: days with data, sessions and sports of a day
//! - Background writer so logging never blocks the BLE loop
//!
//! # Example
//!
//! ```no_run
//! use innertemp_store::SessionLog;
//! use innertemp_types::Sport;
//!
//! let mut log = SessionLog::open_default()?;
//! log.start_new_session(Sport::Running);
//! log.log_temperature(37.2);
//!
//! if let Some(stats) = log.temperature_stats_for_date(2024, 3, 17, None) {
//!     println!("{:.1} - {:.1}", stats.lowest, stats.highest);
//! }
//! # Ok::<(), innertemp_store::Error>(())
//! ```

mod error;
mod naming;
mod store;
mod writer;

pub use error::{Error, Result};
pub use naming::{FILE_EXTENSION, FILE_PREFIX, SessionFileName};
pub use store::{HEADER, SessionLog, local_now, session_id_at};
pub use writer::{STORE_EVENT_CAPACITY, SessionWriter, StoreEvent};

/// Default data directory following platform conventions.
///
/// - Linux: `~/.local/share/innertemp`
/// - macOS: `~/Library/Application Support/innertemp`
/// - Windows: `C:\Users\<user>\AppData\Local\innertemp`
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("innertemp")
}
