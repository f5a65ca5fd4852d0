//! Chunk hash tables.

use std::fmt;

use super::ResourceError;

/// Opaque content hash of a single chunk.
///
/// The bytes are whatever the configured [`ChunkHasher`](crate::chunked::ChunkHasher)
/// produces; the table only compares them for equality.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ChunkHash(Vec<u8>);

impl ChunkHash {
    /// Wrap raw hash bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hexadecimal hash as served by the metadata API.
    pub fn from_hex(hex_str: &str) -> Result<Self, ResourceError> {
        hex::decode(hex_str.trim())
            .map(Self)
            .map_err(|e| ResourceError::InvalidHash {
                value: hex_str.to_string(),
                reason: e.to_string(),
            })
    }

    /// Raw hash bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hexadecimal form.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({})", self.to_hex())
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Fixed-size chunk layout of a resource with one hash per chunk.
///
/// Every chunk is `chunk_size` bytes except possibly the last one, which
/// holds whatever is left of the resource. An empty table means the
/// resource cannot be verified chunk by chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkTable {
    chunk_size: u64,
    hashes: Vec<ChunkHash>,
}

impl ChunkTable {
    /// Create a table from a chunk size and ordered chunk hashes.
    pub fn new(chunk_size: u64, hashes: Vec<ChunkHash>) -> Result<Self, ResourceError> {
        if chunk_size == 0 && !hashes.is_empty() {
            return Err(ResourceError::InvalidChunkTable(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        Ok(Self { chunk_size, hashes })
    }

    /// A table with no chunk data.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether chunk-level verification is available.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Size of every chunk but the last.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Number of chunks in the table.
    pub fn chunk_count(&self) -> usize {
        self.hashes.len()
    }

    /// Expected hash of chunk `index`.
    pub fn hash(&self, index: usize) -> Option<&ChunkHash> {
        self.hashes.get(index)
    }

    /// Length of chunk `index` in a resource of `total_size` bytes.
    pub fn chunk_len(&self, index: usize, total_size: u64) -> u64 {
        let start = index as u64 * self.chunk_size;
        total_size.saturating_sub(start).min(self.chunk_size)
    }

    /// Number of chunks needed to cover `total_size` bytes.
    pub fn expected_count(&self, total_size: u64) -> usize {
        if self.chunk_size == 0 {
            return 0;
        }
        total_size.div_ceil(self.chunk_size) as usize
    }

    /// Check that the table covers exactly `total_size` bytes.
    pub fn validate_for(&self, total_size: u64) -> Result<(), ResourceError> {
        if self.is_empty() {
            return Ok(());
        }
        let expected = self.expected_count(total_size);
        if expected != self.hashes.len() {
            return Err(ResourceError::InvalidChunkTable(format!(
                "{} bytes in chunks of {} need {} hashes, table has {}",
                total_size,
                self.chunk_size,
                expected,
                self.hashes.len()
            )));
        }
        Ok(())
    }
}
