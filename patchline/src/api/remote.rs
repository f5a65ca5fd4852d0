//! Typed metadata endpoints for one application.

use reqwest::Url;
use tracing::{debug, warn};

use super::client::ApiClient;
use super::error::{ApiError, ApiResult};
use super::models::{
    ChunksModel, ContentSummary, DiffSummary, ResourceUrlModel, TorrentUrl, VersionId,
};
use crate::resource::{ChunkHash, ChunkTable, RemoteResource, ResourceError, ResourceUrl};

/// Short hashes are served without leading zeros.
const MIN_HASH_DIGITS: usize = 8;

/// Package flavour: the full content or the diff from the previous version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Content,
    Diff,
}

impl PackageKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Diff => "diff",
        }
    }
}

/// Metadata for one application, addressed by its secret.
pub struct RemoteMetaData {
    client: ApiClient,
    app_secret: String,
}

impl RemoteMetaData {
    pub fn new(client: ApiClient, app_secret: impl Into<String>) -> ApiResult<Self> {
        let app_secret = app_secret.into();
        if app_secret.trim().is_empty() {
            return Err(ApiError::MissingSecret);
        }
        Ok(Self { client, app_secret })
    }

    fn version_path(&self, version: u32, endpoint: &str) -> ApiResult<String> {
        if version == 0 {
            return Err(ApiError::InvalidVersion(version));
        }
        Ok(format!("1/apps/{}/versions/{}/{}", self.app_secret, version, endpoint))
    }

    /// Id of the newest published version.
    pub fn latest_version_id(&self) -> ApiResult<u32> {
        let path = format!("1/apps/{}/versions/latest/id", self.app_secret);
        let version: VersionId = self.client.get_json(&path, None)?;
        Ok(version.id)
    }

    pub fn content_summary(&self, version: u32) -> ApiResult<ContentSummary> {
        let path = self.version_path(version, "content_summary")?;
        self.client.get_json(&path, None)
    }

    pub fn diff_summary(&self, version: u32) -> ApiResult<DiffSummary> {
        let path = self.version_path(version, "diff_summary")?;
        self.client.get_json(&path, None)
    }

    /// Mirrors of the content package, optionally ranked for `country`.
    pub fn content_urls(
        &self,
        version: u32,
        country: Option<&str>,
        key_secret: Option<&str>,
    ) -> ApiResult<Vec<ResourceUrl>> {
        self.urls(PackageKind::Content, version, country, key_secret)
    }

    /// Mirrors of the diff package.
    pub fn diff_urls(
        &self,
        version: u32,
        country: Option<&str>,
        key_secret: Option<&str>,
    ) -> ApiResult<Vec<ResourceUrl>> {
        self.urls(PackageKind::Diff, version, country, key_secret)
    }

    pub fn content_torrent_url(
        &self,
        version: u32,
        key_secret: Option<&str>,
    ) -> ApiResult<String> {
        self.torrent_url(PackageKind::Content, version, key_secret)
    }

    pub fn diff_torrent_url(
        &self,
        version: u32,
        key_secret: Option<&str>,
    ) -> ApiResult<String> {
        self.torrent_url(PackageKind::Diff, version, key_secret)
    }

    /// Everything needed to download the content package of `version`.
    pub fn content_resource(
        &self,
        version: u32,
        country: Option<&str>,
        key_secret: Option<&str>,
    ) -> ApiResult<RemoteResource> {
        self.resource(PackageKind::Content, version, country, key_secret)
    }

    /// Everything needed to download the diff package of `version`.
    pub fn diff_resource(
        &self,
        version: u32,
        country: Option<&str>,
        key_secret: Option<&str>,
    ) -> ApiResult<RemoteResource> {
        self.resource(PackageKind::Diff, version, country, key_secret)
    }

    /// Assemble a [`RemoteResource`] from summary, mirrors and torrent URL.
    ///
    /// A failed torrent lookup leaves the resource without torrent URLs;
    /// the other lookups are required.
    pub fn resource(
        &self,
        kind: PackageKind,
        version: u32,
        country: Option<&str>,
        key_secret: Option<&str>,
    ) -> ApiResult<RemoteResource> {
        debug!(?kind, version, "Assembling remote resource");

        let (size, hash_code, chunks) = match kind {
            PackageKind::Content => {
                let summary = self.content_summary(version)?;
                (summary.size, summary.hash_code, summary.chunks)
            }
            PackageKind::Diff => {
                let summary = self.diff_summary(version)?;
                (summary.size, summary.hash_code, summary.chunks)
            }
        };
        let urls = self.urls(kind, version, country, key_secret)?;

        let invalid = |reason: String| ApiError::InvalidResponse {
            url: format!("{}_summary of version {}", kind.prefix(), version),
            reason,
        };
        let table = chunk_table(&chunks).map_err(|e| invalid(e.to_string()))?;
        let resource = RemoteResource::new(size, hash_code.to_lowercase(), table, urls)
            .map_err(|e| invalid(e.to_string()))?;

        match self.torrent_url(kind, version, key_secret) {
            Ok(url) => Ok(resource.with_torrent_urls(vec![url])),
            Err(e) => {
                warn!(error = %e, version, "Torrent URL unavailable");
                Ok(resource)
            }
        }
    }

    fn urls(
        &self,
        kind: PackageKind,
        version: u32,
        country: Option<&str>,
        key_secret: Option<&str>,
    ) -> ApiResult<Vec<ResourceUrl>> {
        let path = self.version_path(version, &format!("{}_urls", kind.prefix()))?;
        let query = build_query(&[("country", country), ("key_secret", key_secret)]);
        let models: Vec<ResourceUrlModel> = self.client.get_json(&path, query.as_deref())?;
        Ok(models.into_iter().map(ResourceUrl::from).collect())
    }

    fn torrent_url(
        &self,
        kind: PackageKind,
        version: u32,
        key_secret: Option<&str>,
    ) -> ApiResult<String> {
        let path = self.version_path(version, &format!("{}_torrent_url", kind.prefix()))?;
        let query = build_query(&[("key_secret", key_secret)]);
        let torrent: TorrentUrl = self.client.get_json(&path, query.as_deref())?;
        Ok(torrent.url)
    }
}

/// URL-encoded query string of the pairs that have a value.
fn build_query(pairs: &[(&str, Option<&str>)]) -> Option<String> {
    let present: Vec<(&str, &str)> = pairs
        .iter()
        .filter_map(|(key, value)| value.filter(|v| !v.is_empty()).map(|v| (*key, v)))
        .collect();
    if present.is_empty() {
        return None;
    }

    let mut url = Url::parse("http://localhost/").ok()?;
    url.query_pairs_mut().extend_pairs(present);
    url.query().map(str::to_string)
}

fn chunk_table(model: &ChunksModel) -> Result<ChunkTable, ResourceError> {
    let hashes = match &model.hashes {
        Some(hashes) if model.size > 0 => hashes,
        _ => return Ok(ChunkTable::empty()),
    };

    let parsed = hashes
        .iter()
        .map(|hash| ChunkHash::from_hex(&pad_hash(hash)))
        .collect::<Result<Vec<_>, _>>()?;
    ChunkTable::new(model.size, parsed)
}

fn pad_hash(hash: &str) -> String {
    let hash = hash.trim();
    let mut width = hash.len().max(MIN_HASH_DIGITS);
    if width % 2 == 1 {
        width += 1;
    }
    format!("{:0>width$}", hash, width = width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::server::{ApiServer, ApiServerSet};
    use crate::http::tests::MockHttpClient;
    use std::sync::Arc;

    const BASE: &str = "https://api.test/1/apps/sec/versions";

    fn metadata(http: &Arc<MockHttpClient>) -> RemoteMetaData {
        let client = ApiClient::new(ApiServerSet::new(ApiServer::https("api.test")), http.clone());
        RemoteMetaData::new(client, "sec").unwrap()
    }

    #[test]
    fn test_missing_secret() {
        let http = Arc::new(MockHttpClient::new());
        let client = ApiClient::new(ApiServerSet::new(ApiServer::https("api.test")), http);
        assert!(matches!(
            RemoteMetaData::new(client, " "),
            Err(ApiError::MissingSecret)
        ));
    }

    #[test]
    fn test_latest_version_id() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(&format!("{}/latest/id", BASE), 200, r#"{"id": 12}"#);
        assert_eq!(metadata(&http).latest_version_id().unwrap(), 12);
    }

    #[test]
    fn test_version_zero_rejected() {
        let http = Arc::new(MockHttpClient::new());
        let result = metadata(&http).content_summary(0);
        assert!(matches!(result, Err(ApiError::InvalidVersion(0))));
        assert!(http.requested_urls().is_empty());
    }

    #[test]
    fn test_urls_query() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(
            &format!("{}/3/diff_urls?country=DE&key_secret=k+s", BASE),
            200,
            r#"[{"url": "https://m1/pkg", "country": "DE"}, {"url": "https://m2/pkg"}]"#,
        );

        let urls = metadata(&http).diff_urls(3, Some("DE"), Some("k s")).unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].country.as_deref(), Some("DE"));
    }

    #[test]
    fn test_content_resource_assembly() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(
            &format!("{}/5/content_summary", BASE),
            200,
            r#"{"size": 10, "hash_code": "ABCD", "chunks": {"size": 8, "hashes": ["1f", "abcdef0123"]}}"#,
        );
        http.respond(&format!("{}/5/content_urls", BASE), 200, r#"[{"url": "https://m/pkg"}]"#);
        http.respond(
            &format!("{}/5/content_torrent_url", BASE),
            200,
            r#"{"url": "https://m/pkg.torrent"}"#,
        );

        let resource = metadata(&http).content_resource(5, None, None).unwrap();

        assert_eq!(resource.size, 10);
        assert_eq!(resource.hash, "abcd");
        assert_eq!(resource.chunks.chunk_count(), 2);
        assert_eq!(resource.chunks.hash(0).unwrap().to_hex(), "0000001f");
        assert_eq!(resource.chunks.hash(1).unwrap().to_hex(), "abcdef0123");
        assert_eq!(resource.torrent_urls, vec!["https://m/pkg.torrent".to_string()]);
    }

    #[test]
    fn test_torrent_lookup_failure_is_tolerated() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(&format!("{}/2/diff_summary", BASE), 200, r#"{"size": 4}"#);
        http.respond(&format!("{}/2/diff_urls", BASE), 200, r#"[{"url": "https://m/d"}]"#);
        http.respond(&format!("{}/2/diff_torrent_url", BASE), 404, "");

        let resource = metadata(&http).diff_resource(2, None, None).unwrap();
        assert!(!resource.has_torrent());
        assert!(!resource.has_chunks());
    }

    #[test]
    fn test_inconsistent_chunk_table_is_invalid_response() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(
            &format!("{}/1/content_summary", BASE),
            200,
            r#"{"size": 100, "chunks": {"size": 8, "hashes": ["00"]}}"#,
        );
        http.respond(&format!("{}/1/content_urls", BASE), 200, "[]");

        let result = metadata(&http).content_resource(1, None, None);
        assert!(matches!(result, Err(ApiError::InvalidResponse { .. })));
    }

    #[test]
    fn test_pad_hash() {
        assert_eq!(pad_hash("1f"), "0000001f");
        assert_eq!(pad_hash("abc"), "00000abc");
        assert_eq!(pad_hash("123456789"), "0123456789");
    }
}
