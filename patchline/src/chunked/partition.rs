//! Range arithmetic for chunked, part-split downloads.
//!
//! Two pure steps turn "give me these bytes" into HTTP requests:
//!
//! 1. [`expand_to_chunks`] widens a range to whole chunks, because only
//!    whole chunks can be verified, without ever running past the resource.
//! 2. [`build_job_queue`] maps the widened range onto a mirror's server-side
//!    parts (`url.0`, `url.1`, ...) and yields one [`DownloadJob`] per part.

use crate::resource::{ByteRange, ChunkTable, ResourceUrl};

/// One HTTP request against a single part of a mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    /// URL of the part (or of the whole resource for unsplit mirrors).
    pub url: String,
    /// Index of the part, `None` for unsplit mirrors.
    pub part_index: Option<u64>,
    /// Range to request, relative to the start of the part.
    pub range: ByteRange,
    /// The same bytes expressed as absolute resource offsets.
    pub absolute: ByteRange,
}

impl DownloadJob {
    /// Number of bytes this job delivers.
    pub fn len(&self) -> u64 {
        self.absolute.len().unwrap_or(0)
    }

    /// Whether the job delivers no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Widen `range` to chunk boundaries, clamped to `total_size`.
///
/// An open end stays open. A table without chunk data leaves the range as is.
pub fn expand_to_chunks(range: ByteRange, chunks: &ChunkTable, total_size: u64) -> ByteRange {
    let chunk_size = chunks.chunk_size();
    if chunk_size == 0 {
        return range;
    }

    let start = range.start / chunk_size * chunk_size;
    let end = range
        .end
        .map(|end| end.div_ceil(chunk_size).saturating_mul(chunk_size).min(total_size));

    ByteRange { start, end }
}

/// Split `range` (after chunk expansion) into per-part jobs for `mirror`.
///
/// Bytes below `resume_offset` are already verified and skipped; parts that
/// lie entirely below it produce no job. A job whose range reaches the end
/// of its part has an open end.
pub fn build_job_queue(
    mirror: &ResourceUrl,
    resume_offset: u64,
    range: ByteRange,
    total_size: u64,
    chunks: &ChunkTable,
) -> Vec<DownloadJob> {
    let expanded = expand_to_chunks(range, chunks, total_size);
    let start = expanded.start.max(resume_offset);
    let end = expanded.resolve_end(total_size);

    if start >= end {
        return Vec::new();
    }

    if !mirror.is_split() {
        let local_end = (end < total_size).then_some(end);
        return vec![DownloadJob {
            url: mirror.url.clone(),
            part_index: None,
            range: ByteRange {
                start,
                end: local_end,
            },
            absolute: ByteRange::new(start, end),
        }];
    }

    let part_size = mirror.part_size;
    let first_part = start / part_size;
    let last_part = (end - 1) / part_size;

    (first_part..=last_part)
        .map(|part| {
            let part_start = part * part_size;
            let part_end = (part_start + part_size).min(total_size);
            let job_start = start.max(part_start);
            let job_end = end.min(part_end);
            let local_end = (job_end < part_end).then(|| job_end - part_start);

            DownloadJob {
                url: mirror.part_url(part),
                part_index: Some(part),
                range: ByteRange {
                    start: job_start - part_start,
                    end: local_end,
                },
                absolute: ByteRange::new(job_start, job_end),
            }
        })
        .collect()
}
