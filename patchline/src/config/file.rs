//! INI configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use tracing::debug;

use super::{ConfigError, ConfigResult};
use crate::api::{ApiServer, ApiServerSet};
use crate::download::{DownloadConfig, HashAlgorithm};

/// Default main API server.
pub const DEFAULT_MAIN_SERVER: &str = "https://api.patchkit.net";

const DEFAULT_API_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Location of `config.ini`: `<config dir>/patchline/config.ini`.
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

/// `<config dir>/patchline`, falling back to the working directory.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("patchline")
}

/// `[api]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub main_server: String,
    pub cache_servers: Vec<String>,
    pub app_secret: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            main_server: DEFAULT_MAIN_SERVER.to_string(),
            cache_servers: Vec::new(),
            app_secret: None,
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
        }
    }
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub timeout_secs: u64,
    pub retry_budget: u32,
    pub retry_delay_secs: u64,
    pub use_torrents: bool,
    pub preferred_country: Option<String>,
    pub torrent_client: Option<PathBuf>,
    pub torrent_timeout_secs: u64,
    pub hash_algorithm: HashAlgorithm,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        let defaults = DownloadConfig::default();
        Self {
            timeout_secs: defaults.timeout.as_secs(),
            retry_budget: defaults.retry_budget,
            retry_delay_secs: defaults.retry_delay.as_secs(),
            use_torrents: defaults.use_torrents,
            preferred_country: None,
            torrent_client: None,
            torrent_timeout_secs: defaults.torrent_timeout.as_secs(),
            hash_algorithm: defaults.hash_algorithm,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Directory for rotated log files.
    pub directory: PathBuf,
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: config_directory().join("logs"),
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Parsed `config.ini`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub api: ApiSettings,
    pub download: DownloadSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        for key in super::ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }

        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories. Unset values are omitted.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut ini = Ini::new();
        for key in super::ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }

        ini.write_to_file(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Download settings as a [`DownloadConfig`].
    pub fn to_download_config(&self) -> DownloadConfig {
        let settings = &self.download;
        let mut config = DownloadConfig::new()
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .with_retry_budget(settings.retry_budget)
            .with_retry_delay(Duration::from_secs(settings.retry_delay_secs))
            .with_torrents(settings.use_torrents)
            .with_torrent_timeout(Duration::from_secs(settings.torrent_timeout_secs))
            .with_hash_algorithm(settings.hash_algorithm);
        if let Some(country) = &settings.preferred_country {
            config = config.with_preferred_country(country.clone());
        }
        if let Some(client) = &settings.torrent_client {
            config = config.with_torrent_client(client.clone());
        }
        config
    }

    /// Main and cache servers from the `[api]` section.
    pub fn to_server_set(&self) -> ConfigResult<ApiServerSet> {
        let parse = |value: &str, key: &str| {
            value.parse::<ApiServer>().map_err(|reason| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
                reason,
            })
        };

        let mut servers = ApiServerSet::new(parse(&self.api.main_server, "api.main_server")?);
        for cache in &self.api.cache_servers {
            servers = servers.with_cache_server(parse(cache, "api.cache_servers")?);
        }
        Ok(servers)
    }

    /// API request timeout.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}
