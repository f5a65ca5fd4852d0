//! Patchline - resumable, mirror-aware package downloads
//!
//! This library fetches large application packages from a set of mirrors
//! and writes them to disk while verifying every chunk as it arrives.
//!
//! - [`resource`] describes what to download: size, hashes, chunk table,
//!   mirrors and torrent descriptors.
//! - [`chunked`] holds the chunk-verified writer and the job partitioner.
//! - [`download`] moves bytes: chunked HTTP, plain HTTP, peer-to-peer and
//!   the transport selector.
//! - [`api`] queries the metadata API with main/cache-server failover.
//! - [`config`] and [`logging`] carry the ambient settings.

pub mod api;
pub mod chunked;
pub mod config;
pub mod download;
pub mod http;
pub mod logging;
pub mod resource;
