//! Progress reporting for resource downloads.
//!
//! Transports call a [`ProgressCallback`] from the downloading thread.
//! UIs that want a steady refresh rate instead feed the callback into
//! [`DownloadProgress`] counters and let a [`ProgressReporter`] poll them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::speed::DownloadSpeedCalculator;

/// Progress callback invoked with `(bytes_downloaded, total_bytes)`.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Callback invoked by [`ProgressReporter`] on every poll.
pub type SnapshotCallback = Box<dyn Fn(ProgressSnapshot) + Send>;

/// Default reporter poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Point-in-time view of a download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    pub bytes_per_second: f64,
}

/// Shared progress counters.
///
/// Safe to update from the download thread while another thread reads.
#[derive(Debug, Default)]
pub struct DownloadProgress {
    downloaded: AtomicU64,
    total: AtomicU64,
    done: AtomicBool,
}

impl DownloadProgress {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest progress values.
    pub fn update(&self, downloaded: u64, total: u64) {
        self.downloaded.store(downloaded, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    /// Bytes downloaded so far.
    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Total expected bytes.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Signal that the download finished.
    pub fn signal_done(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    /// Check if the download finished.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// A [`ProgressCallback`] that writes into these counters.
    pub fn callback(self: &Arc<Self>) -> ProgressCallback {
        let progress = Arc::clone(self);
        Arc::new(move |downloaded, total| progress.update(downloaded, total))
    }
}

/// Background thread that periodically reports [`DownloadProgress`].
pub struct ProgressReporter {
    handle: Option<JoinHandle<()>>,
    progress: Arc<DownloadProgress>,
}

impl ProgressReporter {
    /// Start polling `progress` every `poll_interval`.
    ///
    /// The callback runs once more after the download is signalled done.
    pub fn start(
        progress: Arc<DownloadProgress>,
        callback: SnapshotCallback,
        poll_interval: Duration,
    ) -> Self {
        let progress_clone = Arc::clone(&progress);

        let handle = thread::spawn(move || {
            let mut speed = DownloadSpeedCalculator::new(Instant::now());
            let snapshot = |speed: &mut DownloadSpeedCalculator| {
                let bytes = progress_clone.downloaded();
                speed.add_sample(bytes, Instant::now());
                ProgressSnapshot {
                    bytes_downloaded: bytes,
                    total_bytes: progress_clone.total(),
                    bytes_per_second: speed.bytes_per_second(),
                }
            };

            while !progress_clone.is_done() {
                callback(snapshot(&mut speed));
                thread::sleep(poll_interval);
            }

            // Final report
            callback(snapshot(&mut speed));
        });

        Self {
            handle: Some(handle),
            progress,
        }
    }

    /// Start a reporter with the default 100ms poll interval.
    pub fn start_default(progress: Arc<DownloadProgress>, callback: SnapshotCallback) -> Self {
        Self::start(progress, callback, DEFAULT_POLL_INTERVAL)
    }

    /// Stop the reporter and wait for its final report.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.progress.signal_done();
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
