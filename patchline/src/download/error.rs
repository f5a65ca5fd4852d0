//! Error types for resource downloads.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// How the failover loop treats a failed attempt against one mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorFailure {
    /// The mirror does not have the resource; drop it for good.
    NotFound,
    /// Bytes failed verification; retry this or another mirror.
    CorruptData,
    /// The response carried no data; retry.
    EmptyStream,
    /// Any other transport-level failure; retry.
    Other,
}

/// Errors that can occur while downloading a remote resource.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The mirror answered 404 or another client error.
    #[error("resource not found at {url} (HTTP {status})")]
    NotFound { url: String, status: u16 },

    /// Downloaded bytes failed chunk or whole-file verification.
    #[error("corrupt data from {url}: {reason}")]
    CorruptData { url: String, reason: String },

    /// The response body was empty.
    #[error("empty response stream from {url}")]
    EmptyStream { url: String },

    /// The connection failed, stalled or ended early.
    #[error("connection to {url} failed: {reason}")]
    Connection { url: String, reason: String },

    /// The mirror answered with an unexpected status (5xx and friends).
    #[error("unexpected HTTP {status} from {url}")]
    ServerError { url: String, status: u16 },

    /// The caller cancelled the download.
    #[error("download cancelled")]
    Cancelled,

    /// The retry budget ran out before any mirror succeeded.
    #[error("too many retries ({attempts}), aborting{}", describe_last(.last))]
    RetryBudgetExhausted {
        attempts: u32,
        last: Option<Box<DownloadError>>,
    },

    /// Every mirror was dropped as permanently unavailable.
    #[error("no usable mirrors left{}", describe_last(.last))]
    NoMirrorsAvailable { last: Option<Box<DownloadError>> },

    /// A finished file failed size or hash validation.
    #[error("validation failed for {}: {reason}", path.display())]
    Validation { path: PathBuf, reason: String },

    /// The peer-to-peer transfer failed.
    #[error("torrent download failed: {0}")]
    Torrent(String),

    /// Another download currently owns the destination.
    #[error("destination {} is in use by another download", path.display())]
    DestinationBusy { path: PathBuf },

    /// The resource descriptor cannot be downloaded with this transport.
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// Failed to read a local file.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write a local file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },
}

fn describe_last(last: &Option<Box<DownloadError>>) -> String {
    last.as_ref()
        .map(|e| format!(" (last error: {})", e))
        .unwrap_or_default()
}

impl DownloadError {
    /// Classify the error for the mirror failover loop.
    ///
    /// Returns `None` for errors that must stop the loop: cancellation and
    /// local failures that no other mirror can fix.
    pub fn mirror_failure(&self) -> Option<MirrorFailure> {
        match self {
            Self::NotFound { .. } => Some(MirrorFailure::NotFound),
            Self::CorruptData { .. } => Some(MirrorFailure::CorruptData),
            Self::EmptyStream { .. } => Some(MirrorFailure::EmptyStream),
            Self::Connection { .. } | Self::ServerError { .. } | Self::Validation { .. } => {
                Some(MirrorFailure::Other)
            }
            _ => None,
        }
    }

    /// Whether the failure points at missing connectivity rather than a
    /// resource that is genuinely unavailable.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::EmptyStream { .. } | Self::ServerError { .. } => true,
            Self::RetryBudgetExhausted { last, .. } | Self::NoMirrorsAvailable { last } => {
                last.as_ref().is_some_and(|e| e.is_connectivity())
            }
            _ => false,
        }
    }

    /// Whether the resource is missing on every mirror that was tried.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::NoMirrorsAvailable { last } => {
                last.as_ref().map_or(true, |e| e.is_unavailable())
            }
            _ => false,
        }
    }

    /// Whether the error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_failure_classification() {
        let not_found = DownloadError::NotFound {
            url: "http://m/a".to_string(),
            status: 404,
        };
        assert_eq!(not_found.mirror_failure(), Some(MirrorFailure::NotFound));

        let corrupt = DownloadError::CorruptData {
            url: "http://m/a".to_string(),
            reason: "chunk 3".to_string(),
        };
        assert_eq!(corrupt.mirror_failure(), Some(MirrorFailure::CorruptData));

        let server = DownloadError::ServerError {
            url: "http://m/a".to_string(),
            status: 503,
        };
        assert_eq!(server.mirror_failure(), Some(MirrorFailure::Other));

        assert_eq!(DownloadError::Cancelled.mirror_failure(), None);
        let write = DownloadError::WriteFailed {
            path: PathBuf::from("/tmp/x"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert_eq!(write.mirror_failure(), None);
    }

    #[test]
    fn test_connectivity_vs_unavailable() {
        let exhausted = DownloadError::RetryBudgetExhausted {
            attempts: 100,
            last: Some(Box::new(DownloadError::Connection {
                url: "http://m/a".to_string(),
                reason: "refused".to_string(),
            })),
        };
        assert!(exhausted.is_connectivity());
        assert!(!exhausted.is_unavailable());

        let gone = DownloadError::NoMirrorsAvailable {
            last: Some(Box::new(DownloadError::NotFound {
                url: "http://m/a".to_string(),
                status: 404,
            })),
        };
        assert!(gone.is_unavailable());
        assert!(!gone.is_connectivity());
    }

    #[test]
    fn test_display_includes_last_error() {
        let err = DownloadError::RetryBudgetExhausted {
            attempts: 3,
            last: Some(Box::new(DownloadError::EmptyStream {
                url: "http://m/a".to_string(),
            })),
        };
        let text = err.to_string();
        assert!(text.contains("too many retries (3)"));
        assert!(text.contains("empty response stream from http://m/a"));
    }
}
