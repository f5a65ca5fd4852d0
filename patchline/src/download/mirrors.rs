//! Mirror ordering and the shared retry loop.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::DownloadConfig;
use super::error::{DownloadError, DownloadResult, MirrorFailure};
use super::stream::wait_or_cancel;
use crate::resource::ResourceUrl;

/// Candidate mirrors for one download, in the order they are tried.
///
/// The set owns its copies; dropping a mirror never touches the resource
/// descriptor it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSet {
    mirrors: Vec<ResourceUrl>,
}

impl MirrorSet {
    /// Order `urls` with mirrors in `preferred_country` first.
    ///
    /// The sort is stable, so declared order is kept within each group.
    pub fn ranked(urls: &[ResourceUrl], preferred_country: Option<&str>) -> Self {
        let mut mirrors = urls.to_vec();
        if let Some(country) = preferred_country {
            mirrors.sort_by_key(|m| {
                !m.country
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(country))
            });
        }
        Self { mirrors }
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceUrl> {
        self.mirrors.iter()
    }

    /// Drop every mirror whose URL is in `urls`.
    pub fn remove_all(&mut self, urls: &[String]) {
        self.mirrors.retain(|m| !urls.contains(&m.url));
    }
}

/// Try `attempt` against each mirror in turn until one succeeds.
///
/// Every attempt spends one unit of the retry budget. Mirrors that report
/// [`MirrorFailure::NotFound`] are dropped; other classified failures keep
/// the mirror. After a failed pass the loop waits `retry_delay`. Errors
/// without a classification (cancellation, local I/O) end the loop at once.
pub(crate) fn run_with_failover<F>(
    mut mirrors: MirrorSet,
    config: &DownloadConfig,
    cancel: &CancellationToken,
    mut attempt: F,
) -> DownloadResult<()>
where
    F: FnMut(&ResourceUrl) -> DownloadResult<()>,
{
    let mut retries_left = config.retry_budget;
    let mut last_error: Option<DownloadError> = None;

    loop {
        let mut dropped = Vec::new();

        for mirror in mirrors.iter() {
            if retries_left == 0 {
                break;
            }
            if cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            retries_left -= 1;

            info!(url = %mirror.url, retries_left, "Trying mirror");
            let error = match attempt(mirror) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            match error.mirror_failure() {
                Some(MirrorFailure::NotFound) => {
                    warn!(url = %mirror.url, error = %error, "Resource missing on mirror, dropping it");
                    dropped.push(mirror.url.clone());
                }
                Some(kind) => {
                    warn!(url = %mirror.url, error = %error, ?kind, "Mirror attempt failed");
                }
                None => return Err(error),
            }
            last_error = Some(error);
        }

        mirrors.remove_all(&dropped);

        if retries_left == 0 {
            return Err(DownloadError::RetryBudgetExhausted {
                attempts: config.retry_budget,
                last: last_error.map(Box::new),
            });
        }
        if mirrors.is_empty() {
            return Err(DownloadError::NoMirrorsAvailable {
                last: last_error.map(Box::new),
            });
        }

        info!(delay = ?config.retry_delay, "All mirrors failed, waiting before trying again");
        wait_or_cancel(config.retry_delay, cancel)?;
    }
}
