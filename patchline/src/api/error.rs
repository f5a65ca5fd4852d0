//! Error types for the metadata API.

use std::fmt;

use thiserror::Error;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Why one server did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFailure {
    /// The server answered with a status that does not count as success.
    ServerError { url: String, status: u16 },
    /// No response at all: refused, timed out, DNS failure.
    Connection { url: String, reason: String },
}

impl fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerError { url, status } => write!(f, "{} returned HTTP {}", url, status),
            Self::Connection { url, reason } => write!(f, "{} unreachable: {}", url, reason),
        }
    }
}

/// Errors from the metadata API client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The main server rejected the request; cache servers were not asked.
    #[error("API request {url} rejected with HTTP {status}")]
    Client { url: String, status: u16 },

    /// No server produced a usable response.
    #[error("all API servers failed ({})", describe(.main_errors, .cache_errors))]
    AllServersFailed {
        main_errors: Vec<ServerFailure>,
        cache_errors: Vec<ServerFailure>,
    },

    /// A response arrived but could not be read or parsed.
    #[error("invalid API response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    /// No application secret is configured.
    #[error("no application secret configured")]
    MissingSecret,

    /// Version ids start at 1.
    #[error("invalid version id {0}")]
    InvalidVersion(u32),
}

fn describe(main: &[ServerFailure], cache: &[ServerFailure]) -> String {
    main.iter()
        .chain(cache)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ApiError {
    /// Whether every server failed at the connection level.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::AllServersFailed {
                main_errors,
                cache_errors,
            } => main_errors
                .iter()
                .chain(cache_errors)
                .all(|e| matches!(e, ServerFailure::Connection { .. })),
            _ => false,
        }
    }
}
