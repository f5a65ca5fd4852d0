//! Descriptions of downloadable remote resources.
//!
//! A [`RemoteResource`] bundles what the metadata API knows about one
//! package: its size and hash, the [`ChunkTable`] used for in-stream
//! verification, the mirrors serving it and optional torrent descriptors.

mod chunks;
mod descriptor;
mod range;

pub use chunks::{ChunkHash, ChunkTable};
pub use descriptor::{RemoteResource, ResourceUrl};
pub use range::ByteRange;

use thiserror::Error;

/// Errors raised while building resource descriptors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The chunk table is inconsistent with itself or the resource size.
    #[error("invalid chunk table: {0}")]
    InvalidChunkTable(String),

    /// A hash value could not be decoded.
    #[error("invalid hash '{value}': {reason}")]
    InvalidHash { value: String, reason: String },

    /// Resources must contain at least one byte.
    #[error("resource size must be greater than zero")]
    EmptyResource,
}
