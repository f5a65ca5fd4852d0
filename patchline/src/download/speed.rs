//! Sliding-window download speed.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long a sample contributes to the average.
pub const SAMPLE_LIFETIME: Duration = Duration::from_secs(10);

/// Minimum spacing between two recorded samples.
pub const MIN_SAMPLE_SPACING: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
struct Sample {
    bytes: u64,
    duration: Duration,
    at: Instant,
}

/// Averages bytes per second over the last [`SAMPLE_LIFETIME`].
///
/// Fed with the cumulative byte count; samples closer than
/// [`MIN_SAMPLE_SPACING`] to the previous one are ignored.
#[derive(Debug, Clone)]
pub struct DownloadSpeedCalculator {
    last_bytes: u64,
    last_at: Instant,
    samples: VecDeque<Sample>,
}

impl DownloadSpeedCalculator {
    /// Start measuring from `now` with nothing downloaded.
    pub fn new(now: Instant) -> Self {
        Self {
            last_bytes: 0,
            last_at: now,
            samples: VecDeque::new(),
        }
    }

    /// Forget all samples and restart from `bytes` at `now`.
    pub fn restart(&mut self, bytes: u64, now: Instant) {
        self.last_bytes = bytes;
        self.last_at = now;
        self.samples.clear();
    }

    /// Record the cumulative byte count observed at `now`.
    pub fn add_sample(&mut self, bytes: u64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_at);
        if elapsed < MIN_SAMPLE_SPACING {
            return;
        }

        // A smaller count means the download restarted.
        if bytes < self.last_bytes {
            self.restart(bytes, now);
            return;
        }

        self.samples.push_back(Sample {
            bytes: bytes - self.last_bytes,
            duration: elapsed,
            at: now,
        });
        self.last_bytes = bytes;
        self.last_at = now;

        while self
            .samples
            .front()
            .is_some_and(|s| now.saturating_duration_since(s.at) > SAMPLE_LIFETIME)
        {
            self.samples.pop_front();
        }
    }

    /// Average speed over the retained samples, in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        let bytes: u64 = self.samples.iter().map(|s| s.bytes).sum();
        let duration: Duration = self.samples.iter().map(|s| s.duration).sum();
        if duration.is_zero() {
            0.0
        } else {
            bytes as f64 / duration.as_secs_f64()
        }
    }
}
