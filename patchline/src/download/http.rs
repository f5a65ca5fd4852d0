//! Plain HTTP downloads for resources without chunk hashes.
//!
//! Each attempt rewrites the destination from scratch, fetching a split
//! mirror's parts in order, and the result is accepted only after the
//! post-download size and hash check.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::checksum::ResourceValidator;
use super::config::DownloadConfig;
use super::error::{DownloadError, DownloadResult};
use super::lock::DestinationLock;
use super::mirrors::{run_with_failover, MirrorSet};
use super::progress::ProgressCallback;
use super::strategy::Transport;
use super::stream::{check_status, pump_body, Flow};
use crate::chunked::build_job_queue;
use crate::http::HttpClient;
use crate::resource::{ByteRange, ChunkTable, RemoteResource, ResourceUrl};

/// HTTP downloader with post-hoc validation.
pub struct HttpDownloader {
    client: Arc<dyn HttpClient>,
    config: DownloadConfig,
    validator: Arc<dyn ResourceValidator>,
}

impl HttpDownloader {
    /// Create a downloader validating with the configured hash algorithm.
    pub fn new(client: Arc<dyn HttpClient>, config: DownloadConfig) -> Self {
        Self {
            validator: config.hash_algorithm.validator(),
            client,
            config,
        }
    }

    /// Replace the whole-resource validator.
    pub fn with_validator(mut self, validator: Arc<dyn ResourceValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Download `resource` into `destination`.
    pub fn download(
        &self,
        resource: &RemoteResource,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        let mut lock = DestinationLock::open(destination)?;
        let _guard = lock.try_acquire()?;

        info!(
            destination = %destination.display(),
            size = resource.size,
            mirrors = resource.urls.len(),
            "Starting HTTP download"
        );

        let mirrors = MirrorSet::ranked(&resource.urls, self.config.preferred_country.as_deref());
        run_with_failover(mirrors, &self.config, cancel, |mirror| {
            self.attempt(resource, mirror, destination, progress, cancel)
        })?;

        info!(destination = %destination.display(), "HTTP download complete");
        Ok(())
    }

    fn attempt(
        &self,
        resource: &RemoteResource,
        mirror: &ResourceUrl,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        let write_error = |e: std::io::Error| DownloadError::WriteFailed {
            path: destination.to_path_buf(),
            source: e,
        };

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        let mut writer = BufWriter::new(File::create(destination).map_err(write_error)?);

        let jobs = build_job_queue(
            mirror,
            0,
            ByteRange::full(),
            resource.size,
            &ChunkTable::empty(),
        );
        let mut downloaded = 0u64;

        for job in &jobs {
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            debug!(url = %job.url, "Requesting part");

            let range = job.part_index.map(|_| job.range);
            let response = self
                .client
                .get(&job.url, range)
                .map_err(|e| DownloadError::Connection {
                    url: job.url.clone(),
                    reason: e.to_string(),
                })?;
            check_status(&job.url, &response)?;

            let mut remaining = job.len();
            pump_body(&job.url, response, cancel, self.config.timeout, |data| {
                let take = (remaining.min(data.len() as u64)) as usize;
                writer.write_all(&data[..take]).map_err(write_error)?;
                remaining -= take as u64;
                downloaded += take as u64;
                if let Some(cb) = progress {
                    cb(downloaded, resource.size);
                }
                Ok(if remaining == 0 {
                    Flow::Stop
                } else {
                    Flow::Continue
                })
            })?;
        }

        writer.flush().map_err(write_error)?;
        drop(writer);

        if let Err(e) = self
            .validator
            .validate(destination, resource.size, &resource.hash)
        {
            warn!(url = %mirror.url, error = %e, "Downloaded file failed validation");
            return Err(DownloadError::CorruptData {
                url: mirror.url.clone(),
                reason: e.to_string(),
            });
        }

        Ok(())
    }
}

impl Transport for HttpDownloader {
    fn name(&self) -> &'static str {
        "http"
    }

    fn download(
        &self,
        resource: &RemoteResource,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        HttpDownloader::download(self, resource, destination, progress, cancel)
    }
}
