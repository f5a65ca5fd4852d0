//! Chunk-verified streaming writer.
//!
//! Bytes are accumulated into a chunk-sized buffer. Once a whole chunk is
//! buffered it is hashed and compared with the chunk table: a match is
//! written through to the sink, a mismatch is dropped and reported so the
//! caller can restart the transfer from [`ChunkedFileWriter::verified_length`].
//!
//! Only verified chunks ever reach the sink, so the sink's length on disk is
//! always a whole number of chunks (or the full resource). A later attempt
//! resumes from that length.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::hasher::ChunkHasher;
use crate::resource::ChunkTable;

/// Destination the writer flushes verified chunks into.
pub trait ChunkSink: Write {
    /// Current length of the sink's contents.
    fn current_len(&self) -> io::Result<u64>;

    /// Cut the sink down to `len` bytes and continue writing from there.
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl ChunkSink for File {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

impl ChunkSink for Vec<u8> {
    fn current_len(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.truncate(len as usize);
        Ok(())
    }
}

/// Result of a successful [`ChunkedFileWriter::write`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every byte was buffered or written through.
    Accepted,
    /// The chunk at `index` failed verification and was discarded.
    ///
    /// Bytes after the corrupt chunk in the same call were not consumed.
    CorruptChunk { index: usize },
}

/// Errors raised by the chunk-verified writer.
#[derive(Debug, Error)]
pub enum ChunkWriteError {
    /// More bytes were written than the resource holds.
    #[error("cannot write {attempted} more bytes: resource is only {total_size} bytes")]
    Overflow { attempted: usize, total_size: u64 },

    /// The writer was given a table it cannot verify against.
    #[error("unusable chunk table: {0}")]
    InvalidTable(String),

    /// The sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Writes a resource chunk by chunk, verifying each against a [`ChunkTable`].
pub struct ChunkedFileWriter<S: ChunkSink> {
    sink: S,
    total_size: u64,
    chunks: ChunkTable,
    hasher: Arc<dyn ChunkHasher>,
    buffer: Vec<u8>,
    chunk_index: usize,
}

impl ChunkedFileWriter<File> {
    /// Open (or create) `path` and resume from its verified contents.
    pub fn open(
        path: &Path,
        total_size: u64,
        chunks: ChunkTable,
        hasher: Arc<dyn ChunkHasher>,
    ) -> Result<Self, ChunkWriteError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        debug!(path = %path.display(), "Opened chunked destination");
        Self::new(file, total_size, chunks, hasher)
    }
}

impl<S: ChunkSink> ChunkedFileWriter<S> {
    /// Wrap `sink`, resuming from its current length when that length is
    /// chunk aligned and recreating it from empty otherwise.
    pub fn new(
        mut sink: S,
        total_size: u64,
        chunks: ChunkTable,
        hasher: Arc<dyn ChunkHasher>,
    ) -> Result<Self, ChunkWriteError> {
        if total_size == 0 {
            return Err(ChunkWriteError::InvalidTable(
                "resource size must be greater than zero".to_string(),
            ));
        }
        if chunks.is_empty() || chunks.chunk_size() == 0 {
            return Err(ChunkWriteError::InvalidTable(
                "chunk table is empty".to_string(),
            ));
        }
        if chunks.chunk_count() < chunks.expected_count(total_size) {
            return Err(ChunkWriteError::InvalidTable(format!(
                "{} hashes cannot cover {} bytes in chunks of {}",
                chunks.chunk_count(),
                total_size,
                chunks.chunk_size()
            )));
        }

        let chunk_size = chunks.chunk_size();
        let existing = sink.current_len()?;
        let chunk_index = if existing == total_size {
            chunks.expected_count(total_size)
        } else if existing < total_size && existing % chunk_size == 0 {
            (existing / chunk_size) as usize
        } else {
            warn!(
                existing,
                chunk_size, total_size, "Destination is not chunk aligned, starting over"
            );
            0
        };

        let resume_len = (chunk_index as u64 * chunk_size).min(total_size);
        sink.truncate_to(resume_len)?;
        if resume_len > 0 {
            debug!(resume_len, chunk_index, "Resuming verified destination");
        }

        Ok(Self {
            sink,
            total_size,
            hasher,
            buffer: Vec::with_capacity(chunk_size as usize),
            chunks,
            chunk_index,
        })
    }

    /// Bytes confirmed against the chunk table and written to the sink.
    pub fn verified_length(&self) -> u64 {
        (self.chunk_index as u64 * self.chunks.chunk_size()).min(self.total_size)
    }

    /// Verified bytes plus bytes buffered for the chunk in progress.
    pub fn saved_length(&self) -> u64 {
        self.verified_length() + self.buffer.len() as u64
    }

    /// Bytes still to be verified.
    pub fn remaining_length(&self) -> u64 {
        self.total_size - self.verified_length()
    }

    /// Total size of the resource.
    pub fn len(&self) -> u64 {
        self.total_size
    }

    /// Whether the resource is empty. Always `false`; construction rejects
    /// empty resources.
    pub fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    /// Whether every chunk has been verified.
    pub fn is_complete(&self) -> bool {
        self.remaining_length() == 0
    }

    /// Index of the chunk currently being assembled.
    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    /// Drop any partially buffered chunk, e.g. before restarting a request.
    pub fn discard_buffered(&mut self) {
        self.buffer.clear();
    }

    /// Feed `data` into the writer.
    ///
    /// Returns [`WriteOutcome::CorruptChunk`] as soon as a chunk fails
    /// verification; the transfer should restart at `verified_length()`.
    pub fn write(&mut self, mut data: &[u8]) -> Result<WriteOutcome, ChunkWriteError> {
        while !data.is_empty() {
            if self.remaining_length() == 0 {
                return Err(ChunkWriteError::Overflow {
                    attempted: data.len(),
                    total_size: self.total_size,
                });
            }

            let chunk_len = self.current_chunk_len() as usize;
            let take = (chunk_len - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buffer.len() == chunk_len {
                if self.buffered_chunk_valid() {
                    self.flush_buffer()?;
                } else {
                    let index = self.chunk_index;
                    warn!(chunk = index, "Chunk failed verification, discarding");
                    self.buffer.clear();
                    return Ok(WriteOutcome::CorruptChunk { index });
                }
            }
        }

        Ok(WriteOutcome::Accepted)
    }

    /// Consume the writer and return the sink.
    pub fn into_inner(self) -> S {
        self.sink
    }

    fn current_chunk_len(&self) -> u64 {
        self.chunks.chunk_len(self.chunk_index, self.total_size)
    }

    fn buffered_chunk_valid(&self) -> bool {
        match self.chunks.hash(self.chunk_index) {
            Some(expected) => self.hasher.hash(&self.buffer) == *expected,
            None => false,
        }
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        self.sink.write_all(&self.buffer)?;
        self.sink.flush()?;
        self.buffer.clear();
        self.chunk_index += 1;
        Ok(())
    }
}

impl<S: ChunkSink> std::fmt::Debug for ChunkedFileWriter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedFileWriter")
            .field("total_size", &self.total_size)
            .field("chunk_size", &self.chunks.chunk_size())
            .field("chunk_index", &self.chunk_index)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
