//! Remote resource descriptors.

use super::chunks::ChunkTable;
use super::ResourceError;

/// One mirror serving the resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUrl {
    /// Base URL of the resource on this mirror.
    pub url: String,
    /// Optional companion metadata URL.
    pub meta_url: Option<String>,
    /// Optional locality hint (ISO country code) used to rank mirrors.
    pub country: Option<String>,
    /// Size of server-side parts; 0 when the mirror serves a single file.
    pub part_size: u64,
}

impl ResourceUrl {
    /// A mirror serving the resource as a single file.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            meta_url: None,
            country: None,
            part_size: 0,
        }
    }

    /// Set the server-side part size.
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    /// Set the locality hint.
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    /// Set the companion metadata URL.
    pub fn with_meta_url(mut self, meta_url: impl Into<String>) -> Self {
        self.meta_url = Some(meta_url.into());
        self
    }

    /// Whether the mirror serves the resource split into parts.
    pub fn is_split(&self) -> bool {
        self.part_size > 0
    }

    /// URL of part `index` (the base URL when the mirror is not split).
    pub fn part_url(&self, index: u64) -> String {
        if self.is_split() {
            format!("{}.{}", self.url, index)
        } else {
            self.url.clone()
        }
    }
}

/// Everything needed to download one package: size, hashes and mirrors.
///
/// Produced by the metadata API for a single version and treated as
/// immutable for the duration of a download attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResource {
    /// Total size in bytes.
    pub size: u64,
    /// Whole-resource content hash (lowercase hex, may be empty).
    pub hash: String,
    /// Per-chunk hashes; empty when chunk verification is unavailable.
    pub chunks: ChunkTable,
    /// Mirrors in declared order.
    pub urls: Vec<ResourceUrl>,
    /// Torrent descriptor URLs for peer-to-peer transfer.
    pub torrent_urls: Vec<String>,
}

impl RemoteResource {
    /// Create a resource and check that its chunk table matches its size.
    pub fn new(
        size: u64,
        hash: impl Into<String>,
        chunks: ChunkTable,
        urls: Vec<ResourceUrl>,
    ) -> Result<Self, ResourceError> {
        if size == 0 {
            return Err(ResourceError::EmptyResource);
        }
        chunks.validate_for(size)?;
        Ok(Self {
            size,
            hash: hash.into(),
            chunks,
            urls,
            torrent_urls: Vec::new(),
        })
    }

    /// Attach torrent descriptor URLs.
    pub fn with_torrent_urls(mut self, torrent_urls: Vec<String>) -> Self {
        self.torrent_urls = torrent_urls;
        self
    }

    /// Whether the resource can be downloaded with chunk verification.
    pub fn has_chunks(&self) -> bool {
        !self.chunks.is_empty()
    }

    /// Whether the resource offers peer-to-peer transfer.
    pub fn has_torrent(&self) -> bool {
        !self.torrent_urls.is_empty()
    }
}
