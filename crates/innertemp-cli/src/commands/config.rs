//! Config command implementation.

use std::path::Path;

use anyhow::{Result, bail};

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: ConfigAction, config: &Config) -> Result<()> {
    let path = Config::path();
    print!("{}", run(action, config, &path)?);
    Ok(())
}

fn run(action: ConfigAction, config: &Config, path: &Path) -> Result<String> {
    match action {
        ConfigAction::Show => Ok(toml::to_string_pretty(config)?),
        ConfigAction::Path => Ok(format!("{}\n", path.display())),
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "Config file already exists at {}. Use --force to overwrite.",
                    path.display()
                );
            }
            Config::default().save_to(path)?;
            Ok(format!("Wrote default configuration to {}\n", path.display()))
        }
    }
}
