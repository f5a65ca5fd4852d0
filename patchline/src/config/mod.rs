//! Configuration file support.
//!
//! Settings live in `config.ini` under the platform config directory
//! (`~/.config/patchline/config.ini` on Linux) with `[api]`, `[download]`
//! and `[logging]` sections. A missing file means defaults.
//!
//! ```ini
//! [api]
//! main_server = https://api.patchkit.net
//! cache_servers = http://cache1.example.com, http://cache2.example.com
//! app_secret = 0123456789abcdef
//!
//! [download]
//! retry_budget = 100
//! use_torrents = false
//! preferred_country = DE
//! hash_algorithm = xxhash32
//! ```

mod file;
mod keys;

use std::path::PathBuf;

use thiserror::Error;

pub use file::{
    config_directory, config_file_path, ApiSettings, ConfigFile, DownloadSettings,
    LoggingSettings, DEFAULT_MAIN_SERVER,
};
pub use keys::ConfigKey;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors reading or writing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}
