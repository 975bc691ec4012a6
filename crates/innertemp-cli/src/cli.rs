//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use innertemp_types::{ActivityMode, AthleticLevel, Sport};
use time::Date;

use crate::util::{YearMonth, parse_date, parse_month};

#[derive(Debug, Parser)]
#[command(name = "innertemp")]
#[command(author, version, about = "Companion for the InnerTemp wearable temperature sensor", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Directory holding the session files (overrides config)
    #[arg(long, global = true, env = "INNERTEMP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Reusable output format arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for nearby sensors
    Scan {
        /// Scan duration in seconds (overrides config)
        #[arg(short, long)]
        timeout: Option<u64>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Connect to the first sensor found and log its readings
    Monitor(MonitorArgs),

    /// Query logged sessions
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Clone, Args)]
pub struct MonitorArgs {
    /// Sport to tag the session with (overrides config)
    #[arg(short, long)]
    pub sport: Option<Sport>,

    /// Scan duration in seconds (overrides config)
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,

    /// Signal strength polling interval in seconds (overrides config)
    #[arg(long)]
    pub rssi_interval: Option<u64>,

    /// Stop after this many readings
    #[arg(short, long)]
    pub count: Option<u32>,

    /// Print mirror records and alerts as JSON lines instead of text
    #[arg(long)]
    pub json: bool,

    /// Disable temperature and battery alerts
    #[arg(long)]
    pub no_alerts: bool,

    /// Activity mode used to pick alert thresholds (overrides config)
    #[arg(long)]
    pub mode: Option<ActivityMode>,

    /// Athletic level used to pick alert thresholds (overrides config)
    #[arg(long)]
    pub level: Option<AthleticLevel>,

    /// Lower alert bound in °C, with --mode custom
    #[arg(long, requires = "high")]
    pub low: Option<f64>,

    /// Upper alert bound in °C, with --mode custom
    #[arg(long, requires = "low")]
    pub high: Option<f64>,
}

/// Selects one day of the log.
#[derive(Debug, Clone, Args)]
pub struct DayArgs {
    /// Day as YYYY-MM-DD
    #[arg(value_parser = parse_date)]
    pub date: Date,

    /// Only include this sport
    #[arg(short, long)]
    pub sport: Option<Sport>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Clone, Subcommand)]
pub enum HistoryAction {
    /// All entries logged on one day
    Day(DayArgs),

    /// Entries of one session
    Session {
        /// Day as YYYY-MM-DD
        #[arg(value_parser = parse_date)]
        date: Date,

        /// Session id (yyyyMMdd_HHmmss)
        id: String,

        /// Sport the session was recorded for
        #[arg(short, long, default_value = "running")]
        sport: Sport,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Lowest, highest and average temperature of one day
    Stats(DayArgs),

    /// Days of a month with logged data
    Days {
        /// Month as YYYY-MM
        #[arg(value_parser = parse_month)]
        month: YearMonth,

        /// Only include this sport
        #[arg(short, long)]
        sport: Option<Sport>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Sessions recorded on one day
    Sessions(DayArgs),

    /// Sports recorded on one day
    Sports {
        /// Day as YYYY-MM-DD
        #[arg(value_parser = parse_date)]
        date: Date,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
