//! Command implementations for the CLI.

mod config;
mod history;
mod monitor;
mod scan;

pub use config::cmd_config;
pub use history::cmd_history;
pub use monitor::cmd_monitor;
pub use scan::{FoundDevice, cmd_scan};
