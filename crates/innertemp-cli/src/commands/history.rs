//! History command implementation.
//!
//! Answers queries from the session files without touching Bluetooth.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use time::Date;

use innertemp_store::SessionLog;

use crate::cli::{DayArgs, HistoryAction, OutputFormat};
use crate::format::{
    FormatOptions, format_days_csv, format_days_text, format_entries_csv, format_entries_text,
    format_no_data, format_sessions_csv, format_sessions_text, format_sports_text,
    format_stats_csv, format_stats_text,
};
use crate::util::write_output;

/// JSON shape of `history days`.
#[derive(Debug, Serialize)]
struct MonthDays<'a> {
    year: i32,
    month: u8,
    days: Vec<&'a u8>,
}

fn ymd(date: Date) -> (i32, u8, u8) {
    (date.year(), u8::from(date.month()), date.day())
}

fn describe(date: Date, sport: Option<innertemp_types::Sport>) -> String {
    match sport {
        Some(sport) => format!("{date} ({sport})"),
        None => date.to_string(),
    }
}

pub fn cmd_history(
    data_dir: PathBuf,
    action: HistoryAction,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let log = SessionLog::open_existing(&data_dir);
    let content = render(&log, action, opts)?;
    write_output(output, &content)
}

/// Run one query against `log` and format the answer.
pub fn render(log: &SessionLog, action: HistoryAction, opts: &FormatOptions) -> Result<String> {
    let content = match action {
        HistoryAction::Day(DayArgs {
            date,
            sport,
            output,
        }) => {
            let (y, m, d) = ymd(date);
            match (log.temperature_data_for_date(y, m, d, sport), output.format) {
                (entries, OutputFormat::Json) => opts.as_json(&entries)?,
                (Some(entries), OutputFormat::Text) => format_entries_text(&entries, opts),
                (Some(entries), OutputFormat::Csv) => format_entries_csv(&entries),
                (None, _) => format_no_data(&describe(date, sport), opts),
            }
        }
        HistoryAction::Session {
            date,
            id,
            sport,
            output,
        } => match (log.temperature_data_for_session(date, &id, sport), output.format) {
            (entries, OutputFormat::Json) => opts.as_json(&entries)?,
            (Some(entries), OutputFormat::Text) => format_entries_text(&entries, opts),
            (Some(entries), OutputFormat::Csv) => format_entries_csv(&entries),
            (None, _) => format_no_data(&format!("session {id} on {}", describe(date, Some(sport))), opts),
        },
        HistoryAction::Stats(DayArgs {
            date,
            sport,
            output,
        }) => {
            let (y, m, d) = ymd(date);
            match (log.temperature_stats_for_date(y, m, d, sport), output.format) {
                (stats, OutputFormat::Json) => opts.as_json(&stats)?,
                (Some(stats), OutputFormat::Text) => format_stats_text(date, &stats, opts),
                (Some(stats), OutputFormat::Csv) => format_stats_csv(&stats),
                (None, _) => format_no_data(&describe(date, sport), opts),
            }
        }
        HistoryAction::Days {
            month,
            sport,
            output,
        } => {
            let days = log.days_with_data_in_month(month.year, month.month, sport);
            match output.format {
                OutputFormat::Text => format_days_text(month.year, month.month, &days),
                OutputFormat::Csv => format_days_csv(month.year, month.month, &days),
                OutputFormat::Json => opts.as_json(&MonthDays {
                    year: month.year,
                    month: month.month,
                    days: days.iter().collect(),
                })?,
            }
        }
        HistoryAction::Sessions(DayArgs {
            date,
            sport,
            output,
        }) => {
            let (y, m, d) = ymd(date);
            let sessions = log.sessions_for_date(y, m, d, sport);
            match output.format {
                OutputFormat::Json => opts.as_json(&sessions)?,
                _ if sessions.is_empty() => format_no_data(&describe(date, sport), opts),
                OutputFormat::Text => format_sessions_text(&sessions),
                OutputFormat::Csv => format_sessions_csv(&sessions),
            }
        }
        HistoryAction::Sports { date, output } => {
            let (y, m, d) = ymd(date);
            let sports = log.sports_for_date(y, m, d);
            match output.format {
                OutputFormat::Json => opts.as_json(&sports)?,
                _ if sports.is_empty() => format_no_data(&describe(date, None), opts),
                OutputFormat::Text | OutputFormat::Csv => format_sports_text(&sports),
            }
        }
    };
    Ok(content)
}
