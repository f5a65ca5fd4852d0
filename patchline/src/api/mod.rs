//! Metadata API client.
//!
//! [`ApiClient`] sends every request to the main server and falls back to
//! the cache servers, in order, when the main server is down. A client-side
//! rejection from the main server is final. [`RemoteMetaData`] layers the
//! typed application endpoints on top and assembles
//! [`RemoteResource`](crate::resource::RemoteResource) descriptors for the
//! download module.

mod client;
mod error;
mod models;
mod remote;
mod server;

pub use client::{ApiClient, ApiResponse};
pub use error::{ApiError, ApiResult, ServerFailure};
pub use models::{
    ChunksModel, ContentSummary, DiffSummary, ResourceUrlModel, SummaryFile, TorrentUrl, VersionId,
};
pub use remote::{PackageKind, RemoteMetaData};
pub use server::{ApiServer, ApiServerSet};
