//! Pluggable chunk hash functions.

use sha2::{Digest, Sha256};
use xxhash_rust::xxh32::xxh32;

use crate::resource::ChunkHash;

/// Seed the metadata API uses for its xxHash32 digests.
pub const DEFAULT_XXHASH_SEED: u32 = 42;

/// Strategy used to hash a chunk before it is compared with the chunk table.
///
/// The hash algorithm is whatever the publishing side used to build the
/// table; this crate only needs the same bytes back for the same input.
pub trait ChunkHasher: Send + Sync {
    /// Hash one complete chunk.
    fn hash(&self, chunk: &[u8]) -> ChunkHash;
}

impl<F> ChunkHasher for F
where
    F: Fn(&[u8]) -> ChunkHash + Send + Sync,
{
    fn hash(&self, chunk: &[u8]) -> ChunkHash {
        self(chunk)
    }
}

/// xxHash32 chunk hasher, digest in big-endian byte order.
///
/// This matches the chunk tables served by the metadata API, whose hex
/// hashes are the digest written as a number.
#[derive(Debug, Clone, Copy)]
pub struct XxHash32ChunkHasher {
    seed: u32,
}

impl XxHash32ChunkHasher {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }
}

impl Default for XxHash32ChunkHasher {
    fn default() -> Self {
        Self::new(DEFAULT_XXHASH_SEED)
    }
}

impl ChunkHasher for XxHash32ChunkHasher {
    fn hash(&self, chunk: &[u8]) -> ChunkHash {
        ChunkHash::new(xxh32(chunk, self.seed).to_be_bytes().to_vec())
    }
}

/// SHA-256 chunk hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256ChunkHasher;

impl ChunkHasher for Sha256ChunkHasher {
    fn hash(&self, chunk: &[u8]) -> ChunkHash {
        ChunkHash::new(Sha256::digest(chunk).to_vec())
    }
}
