//! Typed access to individual configuration keys.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFile;
use super::{ConfigError, ConfigResult};

/// One `section.key` entry of `config.ini`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ApiMainServer,
    ApiCacheServers,
    ApiAppSecret,
    ApiTimeoutSecs,
    DownloadTimeoutSecs,
    DownloadRetryBudget,
    DownloadRetryDelaySecs,
    DownloadUseTorrents,
    DownloadPreferredCountry,
    DownloadTorrentClient,
    DownloadTorrentTimeoutSecs,
    DownloadHashAlgorithm,
    LoggingDirectory,
    LoggingLevel,
}

impl ConfigKey {
    /// Every key, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        &[
            Self::ApiMainServer,
            Self::ApiCacheServers,
            Self::ApiAppSecret,
            Self::ApiTimeoutSecs,
            Self::DownloadTimeoutSecs,
            Self::DownloadRetryBudget,
            Self::DownloadRetryDelaySecs,
            Self::DownloadUseTorrents,
            Self::DownloadPreferredCountry,
            Self::DownloadTorrentClient,
            Self::DownloadTorrentTimeoutSecs,
            Self::DownloadHashAlgorithm,
            Self::LoggingDirectory,
            Self::LoggingLevel,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            Self::ApiMainServer
            | Self::ApiCacheServers
            | Self::ApiAppSecret
            | Self::ApiTimeoutSecs => "api",
            Self::LoggingDirectory | Self::LoggingLevel => "logging",
            _ => "download",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            Self::ApiMainServer => "main_server",
            Self::ApiCacheServers => "cache_servers",
            Self::ApiAppSecret => "app_secret",
            Self::ApiTimeoutSecs | Self::DownloadTimeoutSecs => "timeout_secs",
            Self::DownloadRetryBudget => "retry_budget",
            Self::DownloadRetryDelaySecs => "retry_delay_secs",
            Self::DownloadUseTorrents => "use_torrents",
            Self::DownloadPreferredCountry => "preferred_country",
            Self::DownloadTorrentClient => "torrent_client",
            Self::DownloadTorrentTimeoutSecs => "torrent_timeout_secs",
            Self::DownloadHashAlgorithm => "hash_algorithm",
            Self::LoggingDirectory => "directory",
            Self::LoggingLevel => "level",
        }
    }

    /// `section.key`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        let api = &config.api;
        let download = &config.download;
        match self {
            Self::ApiMainServer => api.main_server.clone(),
            Self::ApiCacheServers => api.cache_servers.join(", "),
            Self::ApiAppSecret => api.app_secret.clone().unwrap_or_default(),
            Self::ApiTimeoutSecs => api.timeout_secs.to_string(),
            Self::DownloadTimeoutSecs => download.timeout_secs.to_string(),
            Self::DownloadRetryBudget => download.retry_budget.to_string(),
            Self::DownloadRetryDelaySecs => download.retry_delay_secs.to_string(),
            Self::DownloadUseTorrents => download.use_torrents.to_string(),
            Self::DownloadPreferredCountry => {
                download.preferred_country.clone().unwrap_or_default()
            }
            Self::DownloadTorrentClient => download
                .torrent_client
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            Self::DownloadTorrentTimeoutSecs => download.torrent_timeout_secs.to_string(),
            Self::DownloadHashAlgorithm => download.hash_algorithm.to_string(),
            Self::LoggingDirectory => config.logging.directory.display().to_string(),
            Self::LoggingLevel => config.logging.level.clone(),
        }
    }

    /// Parse `value` and store it.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> ConfigResult<()> {
        let value = value.trim();
        match self {
            Self::ApiMainServer => {
                if value.is_empty() {
                    return Err(self.invalid(value, "main server cannot be empty"));
                }
                config.api.main_server = value.to_string();
            }
            Self::ApiCacheServers => {
                config.api.cache_servers = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            Self::ApiAppSecret => config.api.app_secret = optional(value),
            Self::ApiTimeoutSecs => config.api.timeout_secs = self.parse(value)?,
            Self::DownloadTimeoutSecs => config.download.timeout_secs = self.parse(value)?,
            Self::DownloadRetryBudget => {
                let budget: u32 = self.parse(value)?;
                if budget == 0 {
                    return Err(self.invalid(value, "retry budget must be at least 1"));
                }
                config.download.retry_budget = budget;
            }
            Self::DownloadRetryDelaySecs => config.download.retry_delay_secs = self.parse(value)?,
            Self::DownloadUseTorrents => config.download.use_torrents = self.parse_bool(value)?,
            Self::DownloadPreferredCountry => {
                config.download.preferred_country = optional(value).map(|c| c.to_uppercase())
            }
            Self::DownloadTorrentClient => {
                config.download.torrent_client = optional(value).map(PathBuf::from)
            }
            Self::DownloadTorrentTimeoutSecs => {
                config.download.torrent_timeout_secs = self.parse(value)?
            }
            Self::DownloadHashAlgorithm => config.download.hash_algorithm = self.parse(value)?,
            Self::LoggingDirectory => {
                if value.is_empty() {
                    return Err(self.invalid(value, "log directory cannot be empty"));
                }
                config.logging.directory = PathBuf::from(value);
            }
            Self::LoggingLevel => {
                config.logging.level = if value.is_empty() {
                    "info".to_string()
                } else {
                    value.to_string()
                }
            }
        }
        Ok(())
    }

    fn parse<T: FromStr>(&self, value: &str) -> ConfigResult<T>
    where
        T::Err: fmt::Display,
    {
        value
            .parse()
            .map_err(|e: T::Err| self.invalid(value, &e.to_string()))
    }

    fn parse_bool(&self, value: &str) -> ConfigResult<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(self.invalid(value, "expected true or false")),
        }
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}
