//! Configuration for resource downloads.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::checksum::{ResourceValidator, Sha256ResourceValidator, XxHash32ResourceValidator};
use crate::chunked::{ChunkHasher, Sha256ChunkHasher, XxHash32ChunkHasher};

/// Default connect and stall timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of attempts shared by all mirrors.
pub const DEFAULT_RETRY_BUDGET: u32 = 100;

/// Default pause after a full pass over the mirrors failed.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Default interval between torrent status polls.
pub const DEFAULT_TORRENT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Hash function behind chunk tables and whole-resource hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// xxHash32 with seed 42, as served by the metadata API.
    #[default]
    XxHash32,
    Sha256,
}

impl HashAlgorithm {
    pub fn chunk_hasher(&self) -> Arc<dyn ChunkHasher> {
        match self {
            Self::XxHash32 => Arc::new(XxHash32ChunkHasher::default()),
            Self::Sha256 => Arc::new(Sha256ChunkHasher),
        }
    }

    pub fn validator(&self) -> Arc<dyn ResourceValidator> {
        match self {
            Self::XxHash32 => Arc::new(XxHash32ResourceValidator::default()),
            Self::Sha256 => Arc::new(Sha256ResourceValidator),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::XxHash32 => write!(f, "xxhash32"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xxhash32" | "xxhash" => Ok(Self::XxHash32),
            "sha256" => Ok(Self::Sha256),
            other => Err(format!(
                "unknown hash algorithm '{}', expected xxhash32 or sha256",
                other
            )),
        }
    }
}

/// Configuration shared by all download transports.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Connect timeout, and how long a body may go without delivering bytes.
    pub timeout: Duration,

    /// Total number of attempts across all mirrors.
    pub retry_budget: u32,

    /// Back-off after every mirror failed once.
    pub retry_delay: Duration,

    /// Whether to try peer-to-peer first when torrent URLs are available.
    pub use_torrents: bool,

    /// Country code whose mirrors are tried first.
    pub preferred_country: Option<String>,

    /// Path of the torrent client executable.
    pub torrent_client: Option<PathBuf>,

    /// How long the torrent may go without progress before giving up.
    pub torrent_timeout: Duration,

    /// Interval between torrent status polls.
    pub torrent_poll_interval: Duration,

    /// Hash function used to verify chunks and finished files.
    pub hash_algorithm: HashAlgorithm,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry_budget: DEFAULT_RETRY_BUDGET,
            retry_delay: DEFAULT_RETRY_DELAY,
            use_torrents: false,
            preferred_country: None,
            torrent_client: None,
            torrent_timeout: DEFAULT_TIMEOUT,
            torrent_poll_interval: DEFAULT_TORRENT_POLL_INTERVAL,
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

impl DownloadConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect and stall timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget (minimum 1).
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget.max(1);
        self
    }

    /// Set the back-off between failed passes.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Enable or disable peer-to-peer downloads.
    pub fn with_torrents(mut self, enabled: bool) -> Self {
        self.use_torrents = enabled;
        self
    }

    /// Prefer mirrors located in `country`.
    pub fn with_preferred_country(mut self, country: impl Into<String>) -> Self {
        self.preferred_country = Some(country.into());
        self
    }

    /// Set the torrent client executable.
    pub fn with_torrent_client(mut self, path: PathBuf) -> Self {
        self.torrent_client = Some(path);
        self
    }

    /// Set the torrent no-progress timeout.
    pub fn with_torrent_timeout(mut self, timeout: Duration) -> Self {
        self.torrent_timeout = timeout;
        self
    }

    /// Set the torrent status poll interval.
    pub fn with_torrent_poll_interval(mut self, interval: Duration) -> Self {
        self.torrent_poll_interval = interval;
        self
    }

    /// Set the hash function for chunk and whole-file verification.
    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.retry_budget, 100);
        assert_eq!(config.retry_delay, Duration::from_secs(10));
        assert!(!config.use_torrents);
        assert!(config.preferred_country.is_none());
        assert_eq!(config.hash_algorithm, HashAlgorithm::XxHash32);
    }

    #[test]
    fn test_hash_algorithm_parse() {
        assert_eq!("SHA256".parse::<HashAlgorithm>(), Ok(HashAlgorithm::Sha256));
        assert_eq!(" xxhash32 ".parse::<HashAlgorithm>(), Ok(HashAlgorithm::XxHash32));
        assert!("md5".parse::<HashAlgorithm>().is_err());
        assert_eq!(HashAlgorithm::Sha256.to_string(), "sha256");
    }

    #[test]
    fn test_hash_algorithm_hashers() {
        let xx = HashAlgorithm::XxHash32.chunk_hasher().hash(b"abc");
        let sha = HashAlgorithm::Sha256.chunk_hasher().hash(b"abc");
        assert_eq!(xx.as_bytes().len(), 4);
        assert_eq!(sha.as_bytes().len(), 32);
    }

    #[test]
    fn test_builder_pattern() {
        let config = DownloadConfig::new()
            .with_timeout(Duration::from_secs(60))
            .with_retry_budget(5)
            .with_retry_delay(Duration::from_millis(10))
            .with_torrents(true)
            .with_preferred_country("DE")
            .with_torrent_client(PathBuf::from("/opt/torrent-client"));

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.retry_budget, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert!(config.use_torrents);
        assert_eq!(config.preferred_country.as_deref(), Some("DE"));
        assert_eq!(
            config.torrent_client,
            Some(PathBuf::from("/opt/torrent-client"))
        );
    }

    #[test]
    fn test_retry_budget_minimum() {
        let config = DownloadConfig::new().with_retry_budget(0);
        assert_eq!(config.retry_budget, 1);
    }
}
