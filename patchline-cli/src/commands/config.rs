//! `config` subcommands: inspect and edit `config.ini`.

use clap::Subcommand;
use patchline::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print one value
    Get {
        /// Key as section.key, e.g. download.retry_budget
        key: String,
    },

    /// Change one value and save the file
    Set {
        /// Key as section.key, e.g. api.app_secret
        key: String,

        /// New value; an empty string clears optional keys
        value: String,
    },

    /// Print every key grouped by section
    List,

    /// Print where the config file lives
    Path,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Get { key } => {
            let key = lookup(&key)?;
            println!("{}", display_value(&key.get(&current())));
        }
        ConfigCommands::Set { key, value } => {
            let key = lookup(&key)?;
            let mut config = current();
            let before = key.get(&config);
            key.set(&mut config, &value)?;
            config.save()?;
            println!(
                "{}: {} -> {}",
                key,
                display_value(&before),
                display_value(&key.get(&config))
            );
        }
        ConfigCommands::List => print_all(&current()),
        ConfigCommands::Path => println!("{}", config_file_path().display()),
    }
    Ok(())
}

/// The saved config, or defaults when it is missing or unreadable.
fn current() -> ConfigFile {
    ConfigFile::load().unwrap_or_default()
}

fn lookup(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown key '{}'. Run 'patchline config list' for the available keys.",
            key
        ))
    })
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}

fn print_all(config: &ConfigFile) {
    println!("# {}", config_file_path().display());

    let mut section = None;
    for key in ConfigKey::all() {
        if section != Some(key.section()) {
            section = Some(key.section());
            println!();
            println!("[{}]", key.section());
        }
        println!("{} = {}", key.key_name(), display_value(&key.get(config)));
    }
}
