//! Chunk-level verification and range partitioning.
//!
//! - [`ChunkedFileWriter`] verifies each chunk against its hash while the
//!   bytes are being written, so corrupt data never reaches the disk.
//! - [`expand_to_chunks`] and [`build_job_queue`] turn a byte range into
//!   chunk-aligned HTTP jobs against a mirror's server-side parts.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use patchline::chunked::{build_job_queue, ChunkedFileWriter, XxHash32ChunkHasher};
//! use patchline::resource::ByteRange;
//!
//! let mut writer = ChunkedFileWriter::open(&dest, resource.size, resource.chunks.clone(),
//!     Arc::new(XxHash32ChunkHasher::default()))?;
//!
//! for job in build_job_queue(&resource.urls[0], writer.verified_length(),
//!     ByteRange::full(), resource.size, &resource.chunks)
//! {
//!     // GET job.url with job.range, feed the body into writer.write()
//! }
//! ```

mod hasher;
mod partition;
mod writer;

pub use hasher::{ChunkHasher, Sha256ChunkHasher, XxHash32ChunkHasher, DEFAULT_XXHASH_SEED};
pub use partition::{build_job_queue, expand_to_chunks, DownloadJob};
pub use writer::{ChunkSink, ChunkWriteError, ChunkedFileWriter, WriteOutcome};
