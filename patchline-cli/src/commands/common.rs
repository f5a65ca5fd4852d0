//! Common types and utilities shared across CLI commands.

use std::str::FromStr;
use std::sync::Arc;

use patchline::api::{ApiClient, PackageKind, RemoteMetaData};
use patchline::config::ConfigFile;
use patchline::http::ReqwestClient;

use crate::error::CliError;

/// Package flavour chosen by the `--diff` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Package {
    /// Full content package
    Content,
    /// Diff against the previous version
    Diff,
}

impl Package {
    pub fn from_diff_flag(diff: bool) -> Self {
        if diff {
            Package::Diff
        } else {
            Package::Content
        }
    }
}

impl From<Package> for PackageKind {
    fn from(package: Package) -> Self {
        match package {
            Package::Content => PackageKind::Content,
            Package::Diff => PackageKind::Diff,
        }
    }
}

/// A version id or `latest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionArg {
    Latest,
    Id(u32),
}

impl VersionArg {
    /// Resolve `latest` against the API.
    pub fn resolve(self, metadata: &RemoteMetaData) -> Result<u32, CliError> {
        match self {
            VersionArg::Id(id) => Ok(id),
            VersionArg::Latest => Ok(metadata.latest_version_id()?),
        }
    }
}

impl FromStr for VersionArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("latest") {
            return Ok(VersionArg::Latest);
        }
        match s.parse::<u32>() {
            Ok(0) | Err(_) => Err(format!(
                "'{}' is not a version id (expected a positive number or 'latest')",
                s
            )),
            Ok(id) => Ok(VersionArg::Id(id)),
        }
    }
}

/// Load the config file, reporting parse errors.
pub fn load_config() -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load()?)
}

/// Build the metadata client from `[api]` settings.
pub fn metadata(config: &ConfigFile) -> Result<RemoteMetaData, CliError> {
    let secret = config.api.app_secret.clone().ok_or_else(|| {
        CliError::Config(
            "No application secret configured. \
             Set it with 'patchline config set api.app_secret <secret>'"
                .to_string(),
        )
    })?;

    let servers = config.to_server_set()?;
    let http = Arc::new(ReqwestClient::with_timeout(config.api_timeout())?);
    Ok(RemoteMetaData::new(ApiClient::new(servers, http), secret)?)
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_arg() {
        assert_eq!("latest".parse::<VersionArg>().unwrap(), VersionArg::Latest);
        assert_eq!("LATEST".parse::<VersionArg>().unwrap(), VersionArg::Latest);
        assert_eq!("42".parse::<VersionArg>().unwrap(), VersionArg::Id(42));
        assert!("0".parse::<VersionArg>().is_err());
        assert!("v1".parse::<VersionArg>().is_err());
    }

    #[test]
    fn test_package_from_diff_flag() {
        assert_eq!(Package::from_diff_flag(true), Package::Diff);
        assert_eq!(Package::from_diff_flag(false), Package::Content);
        assert_eq!(
            PackageKind::from(Package::from_diff_flag(true)),
            PackageKind::Diff
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_metadata_requires_secret() {
        let config = ConfigFile::default();
        assert!(matches!(metadata(&config), Err(CliError::Config(_))));
    }
}
