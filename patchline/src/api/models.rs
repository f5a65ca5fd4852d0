//! JSON models returned by the metadata API.

use serde::Deserialize;

use crate::resource::ResourceUrl;

/// Response of `versions/latest/id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct VersionId {
    pub id: u32,
}

/// Chunk hash table as served by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChunksModel {
    #[serde(default)]
    pub size: u64,
    /// Hexadecimal chunk hashes.
    #[serde(default)]
    pub hashes: Option<Vec<String>>,
}

/// One file listed in a content summary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SummaryFile {
    pub path: String,
    #[serde(default)]
    pub hash: Option<String>,
}

/// Summary of a full content package.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContentSummary {
    #[serde(default)]
    pub version: Option<String>,
    pub size: u64,
    #[serde(default)]
    pub uncompressed_size: u64,
    #[serde(default)]
    pub encryption_method: Option<String>,
    #[serde(default)]
    pub compression_method: Option<String>,
    #[serde(default)]
    pub files: Vec<SummaryFile>,
    #[serde(default)]
    pub hash_code: String,
    #[serde(default)]
    pub chunks: ChunksModel,
}

/// Summary of a diff package.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiffSummary {
    #[serde(default)]
    pub version: Option<String>,
    pub size: u64,
    #[serde(default)]
    pub uncompressed_size: u64,
    #[serde(default)]
    pub encryption_method: Option<String>,
    #[serde(default)]
    pub compression_method: Option<String>,
    #[serde(default)]
    pub added_files: Vec<String>,
    #[serde(default)]
    pub modified_files: Vec<String>,
    #[serde(default)]
    pub removed_files: Vec<String>,
    #[serde(default)]
    pub hash_code: String,
    #[serde(default)]
    pub chunks: ChunksModel,
}

/// Mirror descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceUrlModel {
    pub url: String,
    #[serde(default)]
    pub meta_url: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub part_size: u64,
}

impl From<ResourceUrlModel> for ResourceUrl {
    fn from(model: ResourceUrlModel) -> Self {
        let mut url = ResourceUrl::new(model.url).with_part_size(model.part_size);
        if let Some(meta_url) = model.meta_url.filter(|m| !m.is_empty()) {
            url = url.with_meta_url(meta_url);
        }
        if let Some(country) = model.country.filter(|c| !c.is_empty()) {
            url = url.with_country(country);
        }
        url
    }
}

/// Response of the torrent URL endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TorrentUrl {
    pub url: String,
}
