//! Byte ranges over a remote resource.
//!
//! Every range in this crate is half-open: `start` is inclusive, `end` is
//! exclusive, and `end == None` means "until the end of the resource (or
//! part)". The HTTP `Range` header uses an inclusive last-byte index instead;
//! [`ByteRange::to_header_value`] is the only place that conversion happens.

use std::fmt;

/// A half-open byte range `[start, end)`, open-ended when `end` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// First byte of the range (inclusive).
    pub start: u64,
    /// One past the last byte of the range, or `None` for "to the end".
    pub end: Option<u64>,
}

impl ByteRange {
    /// Create a bounded range `[start, end)`.
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Create an open-ended range starting at `start`.
    pub fn from(start: u64) -> Self {
        Self { start, end: None }
    }

    /// The range covering a whole resource.
    pub fn full() -> Self {
        Self::from(0)
    }

    /// Whether the range runs to the end of its container.
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Number of bytes covered, if bounded.
    pub fn len(&self) -> Option<u64> {
        self.end.map(|end| end.saturating_sub(self.start))
    }

    /// Whether the range is bounded and covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Resolve an open end against a concrete container size.
    pub fn resolve_end(&self, size: u64) -> u64 {
        self.end.map_or(size, |end| end.min(size))
    }

    /// Value for an HTTP `Range` header (`bytes=a-b` with `b` inclusive).
    ///
    /// Returns `None` for an empty bounded range, which cannot be expressed.
    pub fn to_header_value(&self) -> Option<String> {
        match self.end {
            None => Some(format!("bytes={}-", self.start)),
            Some(end) if end > self.start => Some(format!("bytes={}-{}", self.start, end - 1)),
            Some(_) => None,
        }
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            None => write!(f, "{}-", self.start),
            Some(end) if end > self.start => write!(f, "{}-{}", self.start, end - 1),
            Some(_) => write!(f, "{}-(empty)", self.start),
        }
    }
}
