//! Chunk-verified downloads across mirrors.
//!
//! Every attempt reopens the destination through [`ChunkedFileWriter`],
//! which keeps the verified prefix and drops anything after it, then asks
//! the mirror only for the bytes still missing. A corrupt chunk aborts the
//! attempt; the next attempt resumes from the last verified chunk.

use std::fs::{File, OpenOptions};
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
use crate::chunked::{
    build_job_queue, ChunkHasher, ChunkWriteError, ChunkedFileWriter, DownloadJob, WriteOutcome,
};
use crate::http::HttpClient;
use crate::resource::{ByteRange, RemoteResource, ResourceUrl};

/// Downloads resources that carry a chunk table.
pub struct ChunkedHttpDownloader {
    client: Arc<dyn HttpClient>,
    config: DownloadConfig,
    hasher: Arc<dyn ChunkHasher>,
    validator: Arc<dyn ResourceValidator>,
}

impl ChunkedHttpDownloader {
    /// Create a downloader verifying with the configured hash algorithm.
    pub fn new(client: Arc<dyn HttpClient>, config: DownloadConfig) -> Self {
        Self {
            hasher: config.hash_algorithm.chunk_hasher(),
            validator: config.hash_algorithm.validator(),
            client,
            config,
        }
    }

    /// Replace the chunk hash function.
    pub fn with_hasher(mut self, hasher: Arc<dyn ChunkHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Replace the whole-resource validator.
    pub fn with_validator(mut self, validator: Arc<dyn ResourceValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Download `resource` into `destination`, resuming verified data.
    pub fn download(
        &self,
        resource: &RemoteResource,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        if !resource.has_chunks() {
            return Err(DownloadError::InvalidResource(
                "chunked download requires a chunk table".to_string(),
            ));
        }

        let mut lock = DestinationLock::open(destination)?;
        let _guard = lock.try_acquire()?;

        info!(
            destination = %destination.display(),
            size = resource.size,
            mirrors = resource.urls.len(),
            "Starting chunked download"
        );

        let mirrors = MirrorSet::ranked(&resource.urls, self.config.preferred_country.as_deref());
        run_with_failover(mirrors, &self.config, cancel, |mirror| {
            self.attempt(resource, mirror, destination, progress, cancel)
        })?;

        info!(destination = %destination.display(), "Chunked download complete");
        Ok(())
    }

    /// One pass over `mirror`: resume, fetch missing jobs, validate.
    fn attempt(
        &self,
        resource: &RemoteResource,
        mirror: &ResourceUrl,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        let mut writer = ChunkedFileWriter::open(
            destination,
            resource.size,
            resource.chunks.clone(),
            Arc::clone(&self.hasher),
        )
        .map_err(|e| writer_error(destination, e))?;

        let resume_offset = writer.verified_length();
        if let Some(cb) = progress {
            cb(resume_offset, resource.size);
        }

        let jobs = build_job_queue(
            mirror,
            resume_offset,
            ByteRange::full(),
            resource.size,
            &resource.chunks,
        );
        debug!(url = %mirror.url, resume_offset, jobs = jobs.len(), "Built job queue");

        for job in &jobs {
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            self.run_job(job, &mut writer, resource.size, destination, progress, cancel)?;
        }

        if !writer.is_complete() {
            return Err(DownloadError::Connection {
                url: mirror.url.clone(),
                reason: format!(
                    "download stopped at {} of {} bytes",
                    writer.verified_length(),
                    resource.size
                ),
            });
        }
        drop(writer);

        if let Err(e) = self
            .validator
            .validate(destination, resource.size, &resource.hash)
        {
            warn!(error = %e, "Resource failed validation, discarding download");
            truncate(destination)?;
            return Err(DownloadError::CorruptData {
                url: mirror.url.clone(),
                reason: e.to_string(),
            });
        }

        Ok(())
    }

    fn run_job(
        &self,
        job: &DownloadJob,
        writer: &mut ChunkedFileWriter<File>,
        total_size: u64,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        debug!(url = %job.url, range = %job.range, "Requesting job");

        let response = self
            .client
            .get(&job.url, Some(job.range))
            .map_err(|e| DownloadError::Connection {
                url: job.url.clone(),
                reason: e.to_string(),
            })?;
        check_status(&job.url, &response)?;

        // A 200 answer to a ranged request carries the whole part.
        let mut to_skip = if response.status == 200 {
            job.range.start
        } else {
            0
        };
        let mut remaining = job.len();
        let mut reported = writer.verified_length();

        pump_body(&job.url, response, cancel, self.config.timeout, |data| {
            let skip = (to_skip.min(data.len() as u64)) as usize;
            to_skip -= skip as u64;
            let data = &data[skip..];
            let take = (remaining.min(data.len() as u64)) as usize;

            match writer.write(&data[..take]) {
                Ok(WriteOutcome::Accepted) => {}
                Ok(WriteOutcome::CorruptChunk { index }) => {
                    return Err(DownloadError::CorruptData {
                        url: job.url.clone(),
                        reason: format!("chunk {} failed verification", index),
                    });
                }
                Err(e) => return Err(writer_error(destination, e)),
            }
            remaining -= take as u64;

            let verified = writer.verified_length();
            if verified != reported {
                reported = verified;
                if let Some(cb) = progress {
                    cb(verified, total_size);
                }
            }

            Ok(if remaining == 0 {
                Flow::Stop
            } else {
                Flow::Continue
            })
        })?;

        if remaining > 0 {
            return Err(DownloadError::Connection {
                url: job.url.clone(),
                reason: format!("stream ended with {} bytes missing", remaining),
            });
        }

        Ok(())
    }
}

impl Transport for ChunkedHttpDownloader {
    fn name(&self) -> &'static str {
        "chunked-http"
    }

    fn download(
        &self,
        resource: &RemoteResource,
        destination: &Path,
        progress: Option<&ProgressCallback>,
        cancel: &CancellationToken,
    ) -> DownloadResult<()> {
        ChunkedHttpDownloader::download(self, resource, destination, progress, cancel)
    }
}

fn writer_error(destination: &Path, error: ChunkWriteError) -> DownloadError {
    match error {
        ChunkWriteError::Io(source) => DownloadError::WriteFailed {
            path: destination.to_path_buf(),
            source,
        },
        other => DownloadError::InvalidResource(other.to_string()),
    }
}

fn truncate(path: &Path) -> DownloadResult<()> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|f| f.set_len(0))
        .map_err(|e| DownloadError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::MockHttpClient;
    use crate::chunked::DEFAULT_XXHASH_SEED;
    use crate::resource::{ChunkHash, ChunkTable};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use xxhash_rust::xxh32::xxh32;

    const CHUNK: u64 = 16;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    fn resource_for(data: &[u8], urls: Vec<ResourceUrl>) -> RemoteResource {
        let hashes = data
            .chunks(CHUNK as usize)
            .map(|c| ChunkHash::new(xxh32(c, DEFAULT_XXHASH_SEED).to_be_bytes().to_vec()))
            .collect();
        RemoteResource::new(
            data.len() as u64,
            format!("{:x}", xxh32(data, DEFAULT_XXHASH_SEED)),
            ChunkTable::new(CHUNK, hashes).unwrap(),
            urls,
        )
        .unwrap()
    }

    fn config() -> DownloadConfig {
        DownloadConfig::new()
            .with_retry_budget(10)
            .with_retry_delay(Duration::from_millis(1))
            .with_timeout(Duration::from_secs(5))
    }

    #[test]
    fn test_downloads_unsplit_mirror() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("game.pkg");
        let data = payload(100);
        let client = Arc::new(MockHttpClient::new());
        client.respond("http://m/pkg", 200, data.clone());

        let downloader = ChunkedHttpDownloader::new(client.clone(), config());
        let resource = resource_for(&data, vec![ResourceUrl::new("http://m/pkg")]);
        downloader
            .download(&resource, &dest, None, &CancellationToken::new())
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn test_downloads_split_mirror_with_progress() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("game.pkg");
        let data = payload(100);
        let client = Arc::new(MockHttpClient::new());
        for (i, part) in data.chunks(40).enumerate() {
            client.respond(&format!("http://m/pkg.{}", i), 206, part.to_vec());
        }

        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        let progress: ProgressCallback = Arc::new(move |done, total| {
            events_clone.lock().unwrap().push((done, total));
        });

        let downloader = ChunkedHttpDownloader::new(client.clone(), config());
        let resource = resource_for(
            &data,
            vec![ResourceUrl::new("http://m/pkg").with_part_size(40)],
        );
        downloader
            .download(&resource, &dest, Some(&progress), &CancellationToken::new())
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), data);
        let events = events.lock().unwrap();
        assert_eq!(events.last(), Some(&(100, 100)));
        assert!(events.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn test_corrupt_mirror_falls_over_to_next() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("game.pkg");
        let data = payload(64);
        let mut bad = data.clone();
        bad[40] ^= 0xFF;

        let client = Arc::new(MockHttpClient::new());
        client.respond("http://bad/pkg", 200, bad);
        client.respond("http://good/pkg", 206, data[32..].to_vec());

        let downloader = ChunkedHttpDownloader::new(client.clone(), config());
        let resource = resource_for(
            &data,
            vec![ResourceUrl::new("http://bad/pkg"), ResourceUrl::new("http://good/pkg")],
        );
        downloader
            .download(&resource, &dest, None, &CancellationToken::new())
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), data);
        let calls = client.calls.lock().unwrap();
        assert_eq!(calls[1].0, "http://good/pkg");
        assert_eq!(calls[1].1, Some(ByteRange::from(32)));
    }

    #[test]
    fn test_full_body_for_ranged_request_is_skipped() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("game.pkg");
        let data = payload(64);
        std::fs::write(&dest, &data[..32]).unwrap();

        let client = Arc::new(MockHttpClient::new());
        client.respond("http://m/pkg", 200, data.clone());

        let downloader = ChunkedHttpDownloader::new(client.clone(), config());
        let resource = resource_for(&data, vec![ResourceUrl::new("http://m/pkg")]);
        downloader
            .download(&resource, &dest, None, &CancellationToken::new())
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn test_validation_failure_truncates_and_retries() {
        struct RejectOnce(Mutex<bool>);
        impl ResourceValidator for RejectOnce {
            fn validate(&self, path: &Path, _: u64, _: &str) -> DownloadResult<()> {
                let mut rejected = self.0.lock().unwrap();
                if *rejected {
                    return Ok(());
                }
                *rejected = true;
                Err(DownloadError::Validation {
                    path: path.to_path_buf(),
                    reason: "hash mismatch".to_string(),
                })
            }
        }

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("game.pkg");
        let data = payload(48);
        let client = Arc::new(MockHttpClient::new());
        client.respond("http://m/pkg", 200, data.clone());

        let downloader = ChunkedHttpDownloader::new(client.clone(), config())
            .with_validator(Arc::new(RejectOnce(Mutex::new(false))));
        let resource = resource_for(&data, vec![ResourceUrl::new("http://m/pkg")]);
        downloader
            .download(&resource, &dest, None, &CancellationToken::new())
            .unwrap();

        assert_eq!(client.calls.lock().unwrap().len(), 2);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn test_requires_chunk_table() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(MockHttpClient::new());
        let downloader = ChunkedHttpDownloader::new(client, config());
        let resource = RemoteResource::new(
            10,
            "",
            ChunkTable::empty(),
            vec![ResourceUrl::new("http://m/pkg")],
        )
        .unwrap();

        let result = downloader.download(
            &resource,
            &temp.path().join("x"),
            None,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(DownloadError::InvalidResource(_))));
    }
}
