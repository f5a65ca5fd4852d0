//! Transport selection for remote resources.
//!
//! This module implements the Strategy pattern: each way of moving bytes
//! (peer-to-peer, chunk-verified HTTP, plain HTTP) is a [`Transport`], and
//! [`RemoteResourceDownloader`] picks one per resource.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::chunked::ChunkedHttpDownloader;
use super::config::DownloadConfig;
use super::error::{DownloadError, DownloadResult};
use super::http::HttpDownloader;
use super::progress::ProgressCallback;
use super::torrent::{ProcessTorrentClient, TorrentClientFactory, TorrentDownloader};
use crate::http::HttpClient;
use crate::resource::RemoteResource;

/// One way of downloading a resource.
pub trait Transport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Download `resource` into `destination`.
    ///
    /// # Arguments
    ///
    /// * `resource` - What to download and where from
    /// * `destination` - Target file path
    /// * `progress` - Optional `(bytes_downloaded, total_bytes)` callback
    /// * `cancel` - Token observed between reads, jobs and retries
    fn download(
        &self,
        resource: &RemoteResource,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()>;
}

/// Which transport delivered the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Torrent,
    ChunkedHttp,
    Http,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Torrent => write!(f, "torrent"),
            Self::ChunkedHttp => write!(f, "chunked HTTP"),
            Self::Http => write!(f, "HTTP"),
        }
    }
}

/// Downloads a [`RemoteResource`] with the best available transport.
///
/// 1. Peer-to-peer when enabled and the resource has torrent URLs. Any
///    failure other than cancellation falls through to HTTP.
/// 2. Chunk-verified HTTP when the resource carries chunk hashes.
/// 3. Plain HTTP with a post-download hash check otherwise.
pub struct RemoteResourceDownloader {
    torrent: Option<Box<dyn Transport>>,
    chunked: Box<dyn Transport>,
    plain: Box<dyn Transport>,
    use_torrents: bool,
}

impl RemoteResourceDownloader {
    /// Build the standard transports from `config`.
    ///
    /// Peer-to-peer is available only when a torrent client is configured.
    pub fn new(client: Arc<dyn HttpClient>, config: DownloadConfig) -> Self {
        let torrent = config.torrent_client.clone().map(|program| {
            let factory: TorrentClientFactory =
                ProcessTorrentClient::launcher(program, config.timeout);
            Box::new(TorrentDownloader::new(
                Arc::clone(&client),
                config.clone(),
                factory,
            )) as Box<dyn Transport>
        });

        Self {
            torrent,
            chunked: Box::new(ChunkedHttpDownloader::new(
                Arc::clone(&client),
                config.clone(),
            )),
            plain: Box::new(HttpDownloader::new(client, config.clone())),
            use_torrents: config.use_torrents,
        }
    }

    /// Assemble a downloader from explicit transports.
    pub fn with_transports(
        torrent: Option<Box<dyn Transport>>,
        chunked: Box<dyn Transport>,
        plain: Box<dyn Transport>,
        use_torrents: bool,
    ) -> Self {
        Self {
            torrent,
            chunked,
            plain,
            use_torrents,
        }
    }

    /// Download `resource` into `destination` and report the transport used.
    pub fn download(
        &self,
        resource: &RemoteResource,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> DownloadResult<TransportKind> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        if self.use_torrents && resource.has_torrent() {
            match &self.torrent {
                Some(torrent) => {
                    info!(transport = torrent.name(), "Trying peer-to-peer download");
                    match torrent.download(resource, destination, progress, cancel) {
                        Ok(()) => return Ok(TransportKind::Torrent),
                        Err(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
                        Err(e) => {
                            warn!(error = %e, "Peer-to-peer download failed, falling back to HTTP");
                        }
                    }
                }
                None => {
                    warn!("Peer-to-peer requested but no torrent client configured");
                }
            }
        }

        let (transport, kind) = if resource.has_chunks() {
            (&self.chunked, TransportKind::ChunkedHttp)
        } else {
            (&self.plain, TransportKind::Http)
        };

        info!(transport = transport.name(), "Downloading over HTTP");
        transport.download(resource, destination, progress, cancel)?;
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ChunkHash, ChunkTable, ResourceUrl};
    use std::sync::Mutex;

    /// Transport that records calls and returns a scripted result.
    struct FakeTransport {
        name: &'static str,
        calls: Arc<Mutex<Vec<&'static str>>>,
        fail_with: Option<fn() -> DownloadError>,
    }

    impl Transport for FakeTransport {
        fn name(&self) -> &'static str {
            self.name
        }

        fn download(
            &self,
            _resource: &RemoteResource,
            _destination: &Path,
            _progress: Option<&ProgressCallback>,
            _cancel: &CancellationToken,
        ) -> DownloadResult<()> {
            self.calls.lock().unwrap().push(self.name);
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }
    }

    fn fake(
        name: &'static str,
        calls: &Arc<Mutex<Vec<&'static str>>>,
        fail_with: Option<fn() -> DownloadError>,
    ) -> Box<dyn Transport> {
        Box::new(FakeTransport {
            name,
            calls: Arc::clone(calls),
            fail_with,
        })
    }

    fn torrent_failure() -> DownloadError {
        DownloadError::Torrent("no peers".to_string())
    }

    fn cancelled() -> DownloadError {
        DownloadError::Cancelled
    }

    fn resource(chunked: bool, torrent: bool) -> RemoteResource {
        let chunks = if chunked {
            ChunkTable::new(8, vec![ChunkHash::new(vec![0]); 2]).unwrap()
        } else {
            ChunkTable::empty()
        };
        let resource =
            RemoteResource::new(16, "", chunks, vec![ResourceUrl::new("http://m/pkg")]).unwrap();
        if torrent {
            resource.with_torrent_urls(vec!["http://m/pkg.torrent".to_string()])
        } else {
            resource
        }
    }

    fn run(
        selector: &RemoteResourceDownloader,
        resource: &RemoteResource,
    ) -> DownloadResult<TransportKind> {
        selector.download(
            resource,
            Path::new("/tmp/unused"),
            None,
            &CancellationToken::new(),
        )
    }

    #[test]
    fn test_torrent_preferred_when_enabled() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = RemoteResourceDownloader::with_transports(
            Some(fake("torrent", &calls, None)),
            fake("chunked", &calls, None),
            fake("plain", &calls, None),
            true,
        );

        assert_eq!(run(&selector, &resource(true, true)).unwrap(), TransportKind::Torrent);
        assert_eq!(*calls.lock().unwrap(), vec!["torrent"]);
    }

    #[test]
    fn test_torrent_failure_falls_through_to_chunked() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = RemoteResourceDownloader::with_transports(
            Some(fake("torrent", &calls, Some(torrent_failure))),
            fake("chunked", &calls, None),
            fake("plain", &calls, None),
            true,
        );

        assert_eq!(
            run(&selector, &resource(true, true)).unwrap(),
            TransportKind::ChunkedHttp
        );
        assert_eq!(*calls.lock().unwrap(), vec!["torrent", "chunked"]);
    }

    #[test]
    fn test_torrent_cancellation_does_not_fall_through() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = RemoteResourceDownloader::with_transports(
            Some(fake("torrent", &calls, Some(cancelled))),
            fake("chunked", &calls, None),
            fake("plain", &calls, None),
            true,
        );

        assert!(matches!(
            run(&selector, &resource(true, true)),
            Err(DownloadError::Cancelled)
        ));
        assert_eq!(*calls.lock().unwrap(), vec!["torrent"]);
    }

    #[test]
    fn test_torrents_disabled_skips_p2p() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = RemoteResourceDownloader::with_transports(
            Some(fake("torrent", &calls, None)),
            fake("chunked", &calls, None),
            fake("plain", &calls, None),
            false,
        );

        run(&selector, &resource(true, true)).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["chunked"]);
    }

    #[test]
    fn test_no_torrent_urls_skips_p2p() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = RemoteResourceDownloader::with_transports(
            Some(fake("torrent", &calls, None)),
            fake("chunked", &calls, None),
            fake("plain", &calls, None),
            true,
        );

        run(&selector, &resource(true, false)).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["chunked"]);
    }

    #[test]
    fn test_no_chunks_uses_plain_http() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = RemoteResourceDownloader::with_transports(
            None,
            fake("chunked", &calls, None),
            fake("plain", &calls, None),
            true,
        );

        assert_eq!(run(&selector, &resource(false, true)).unwrap(), TransportKind::Http);
        assert_eq!(*calls.lock().unwrap(), vec!["plain"]);
    }

    #[test]
    fn test_chunked_failure_is_final() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = RemoteResourceDownloader::with_transports(
            None,
            fake("chunked", &calls, Some(torrent_failure)),
            fake("plain", &calls, None),
            false,
        );

        assert!(run(&selector, &resource(true, false)).is_err());
        assert_eq!(*calls.lock().unwrap(), vec!["chunked"]);
    }

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::ChunkedHttp.to_string(), "chunked HTTP");
    }
}
