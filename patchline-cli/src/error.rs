//! CLI error type and exit codes.

use std::fmt;

use patchline::api::ApiError;
use patchline::config::ConfigError;
use patchline::download::DownloadError;
use patchline::http::HttpError;

/// Errors surfaced to the user.
#[derive(Debug)]
pub enum CliError {
    /// Bad configuration or arguments.
    Config(String),
    /// Metadata API failure.
    Api(ApiError),
    /// Download failure.
    Download(DownloadError),
    /// HTTP client could not be built.
    Http(HttpError),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 2,
            CliError::Api(e) if e.is_connectivity() => 3,
            CliError::Api(_) => 4,
            CliError::Download(DownloadError::Cancelled) => 130,
            CliError::Download(DownloadError::DestinationBusy { .. }) => 6,
            CliError::Download(e) if e.is_connectivity() => 3,
            CliError::Download(_) => 5,
            CliError::Http(_) => 1,
        }
    }

    /// Print the error and exit.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);
        if let CliError::Download(e) = self {
            if e.is_unavailable() {
                eprintln!("The package is not available on any mirror.");
            } else if e.is_connectivity() {
                eprintln!("Check your network connection and try again.");
            }
        }
        std::process::exit(self.exit_code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::Api(e) => write!(f, "{}", e),
            CliError::Download(e) => write!(f, "{}", e),
            CliError::Http(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ApiError> for CliError {
    fn from(e: ApiError) -> Self {
        CliError::Api(e)
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        CliError::Download(e)
    }
}

impl From<HttpError> for CliError {
    fn from(e: HttpError) -> Self {
        CliError::Http(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Config("x".to_string()).exit_code(), 2);
        assert_eq!(CliError::Download(DownloadError::Cancelled).exit_code(), 130);
        assert_eq!(CliError::Api(ApiError::MissingSecret).exit_code(), 4);
    }
}
