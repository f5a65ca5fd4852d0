//! Resource download transports.
//!
//! This module moves a [`RemoteResource`](crate::resource::RemoteResource)
//! from its mirrors onto disk:
//! - Chunk-verified, resumable HTTP downloads (`chunked`)
//! - Plain HTTP downloads with post-hoc validation (`http`)
//! - Peer-to-peer downloads through a torrent client (`torrent`)
//! - Mirror ordering and the shared retry loop (`mirrors`)
//! - Transport selection (`strategy`)
//! - Progress counters and speed estimation (`progress`, `speed`)
//!
//! # Architecture
//!
//! ```text
//! RemoteResourceDownloader (selector)
//!         │
//!         ├── Transport (trait)
//!         │       ├── TorrentDownloader ── TorrentClient (trait)
//!         │       ├── ChunkedHttpDownloader ── ChunkedFileWriter
//!         │       └── HttpDownloader
//!         │
//!         ├── run_with_failover (MirrorSet, retry budget, back-off)
//!         │
//!         └── DestinationLock (one writer per destination)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use patchline::download::{DownloadConfig, RemoteResourceDownloader};
//! use patchline::http::ReqwestClient;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = DownloadConfig::new().with_preferred_country("DE");
//! let client = Arc::new(ReqwestClient::streaming(config.timeout)?);
//! let downloader = RemoteResourceDownloader::new(client, config);
//!
//! let kind = downloader.download(&resource, &dest, None, &CancellationToken::new())?;
//! println!("Downloaded over {}", kind);
//! ```

mod checksum;
mod chunked;
mod config;
mod error;
mod http;
mod lock;
mod mirrors;
mod progress;
mod speed;
mod strategy;
mod stream;
mod torrent;

pub use checksum::{
    calculate_file_checksum, calculate_file_xxhash32, ResourceValidator, Sha256ResourceValidator,
    XxHash32ResourceValidator,
};
pub use chunked::ChunkedHttpDownloader;
pub use config::{DownloadConfig, HashAlgorithm};
pub use error::{DownloadError, DownloadResult, MirrorFailure};
pub use http::HttpDownloader;
pub use lock::{DestinationGuard, DestinationLock};
pub use mirrors::MirrorSet;
pub use progress::{
    DownloadProgress, ProgressCallback, ProgressReporter, ProgressSnapshot, SnapshotCallback,
};
pub use speed::DownloadSpeedCalculator;
pub use strategy::{RemoteResourceDownloader, Transport, TransportKind};
pub use torrent::{
    ProcessTorrentClient, TorrentClient, TorrentClientFactory, TorrentDownloader, TorrentStatus,
};
