use clap::Subcommand;
use shieldgate_core::{Config, ConfigError};

use super::{print_json, CliResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value by dotted key (e.g. "unlock.lookback_secs")
    Get { key: String },
    /// Validate and store one value
    Set { key: String, value: String },
    /// Print the whole configuration as JSON
    List,
    /// Overwrite config.toml with defaults
    Reset,
    /// Print the location of config.toml
    Path,
}

pub fn run(action: ConfigAction) -> CliResult {
    match action {
        ConfigAction::Get { key } => {
            let value = Config::load()?
                .get(&key)
                .ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            tracing::info!(key = %key, "config updated");
            println!("{key} = {}", config.get(&key).unwrap_or(value));
        }
        ConfigAction::List => print_json(&Config::load()?)?,
        ConfigAction::Reset => {
            Config::default().save()?;
            eprintln!("config reset to defaults");
        }
        ConfigAction::Path => println!("{}", Config::path()?.display()),
    }
    Ok(())
}
