//! Cancellable streaming of HTTP bodies.
//!
//! Blocking reads cannot be interrupted, so the body is read on a worker
//! thread and handed over through a bounded channel. The caller polls the
//! channel and checks cancellation and stall time between polls.

use std::io::Read;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::error::{DownloadError, DownloadResult};
use crate::http::HttpResponse;

/// Buffer size for reading response bodies (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// How often the caller wakes up to check for cancellation.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the consumer wants after handling a block of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

enum Message {
    Data(Vec<u8>),
    Failed(std::io::Error),
    End,
}

/// Feed the body of `response` to `on_data` until it ends or `on_data`
/// stops.
///
/// Returns the number of bytes received. A body that delivers nothing is
/// [`DownloadError::EmptyStream`]; no bytes for `stall_timeout` is a
/// [`DownloadError::Connection`] failure.
pub(crate) fn pump_body<F>(
    url: &str,
    response: HttpResponse,
    cancel: &CancellationToken,
    stall_timeout: Duration,
    mut on_data: F,
) -> DownloadResult<u64>
where
    F: FnMut(&[u8]) -> DownloadResult<Flow>,
{
    let (tx, rx) = mpsc::sync_channel::<Message>(4);
    let mut body = response.into_body();

    thread::spawn(move || {
        let mut buffer = vec![0u8; BUFFER_SIZE];
        loop {
            let message = match body.read(&mut buffer) {
                Ok(0) => Message::End,
                Ok(n) => Message::Data(buffer[..n].to_vec()),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => Message::Failed(e),
            };
            let last = !matches!(message, Message::Data(_));
            // The receiver is gone once the consumer stops or fails.
            if tx.send(message).is_err() || last {
                break;
            }
        }
    });

    let mut received = 0u64;
    let mut last_data = Instant::now();

    loop {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Message::Data(data)) => {
                received += data.len() as u64;
                last_data = Instant::now();
                trace!(url = %url, bytes = data.len(), "Received body block");
                if on_data(&data)? == Flow::Stop {
                    break;
                }
            }
            Ok(Message::End) => break,
            Ok(Message::Failed(e)) => {
                return Err(DownloadError::Connection {
                    url: url.to_string(),
                    reason: format!("read error: {}", e),
                });
            }
            Err(RecvTimeoutError::Timeout) => {
                if last_data.elapsed() >= stall_timeout {
                    return Err(DownloadError::Connection {
                        url: url.to_string(),
                        reason: format!("no data received for {:?}", stall_timeout),
                    });
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(DownloadError::Connection {
                    url: url.to_string(),
                    reason: "body reader stopped unexpectedly".to_string(),
                });
            }
        }
    }

    if received == 0 {
        return Err(DownloadError::EmptyStream {
            url: url.to_string(),
        });
    }

    Ok(received)
}

/// Map a response status to the mirror failure it represents.
///
/// 200 and 206 pass; 4xx means the mirror does not have the resource.
pub(crate) fn check_status(url: &str, response: &HttpResponse) -> DownloadResult<()> {
    match response.status {
        200 | 206 => Ok(()),
        status if response.is_client_error() => Err(DownloadError::NotFound {
            url: url.to_string(),
            status,
        }),
        status => Err(DownloadError::ServerError {
            url: url.to_string(),
            status,
        }),
    }
}

/// Sleep for `duration` in poll-sized slices, failing fast on cancellation.
pub(crate) fn wait_or_cancel(duration: Duration, cancel: &CancellationToken) -> DownloadResult<()> {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct StallingReader;

    impl Read for StallingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            thread::sleep(Duration::from_secs(5));
            Ok(0)
        }
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        }
    }

    fn pump(
        response: HttpResponse,
        on_data: impl FnMut(&[u8]) -> DownloadResult<Flow>,
    ) -> DownloadResult<u64> {
        pump_body(
            "http://m/a",
            response,
            &CancellationToken::new(),
            Duration::from_secs(5),
            on_data,
        )
    }

    #[test]
    fn test_pump_collects_body() {
        let response = HttpResponse::from_bytes(200, vec![7u8; 200_000]);
        let mut collected = Vec::new();
        let received = pump(response, |data| {
            collected.extend_from_slice(data);
            Ok(Flow::Continue)
        })
        .unwrap();

        assert_eq!(received, 200_000);
        assert_eq!(collected.len(), 200_000);
    }

    #[test]
    fn test_pump_empty_body() {
        let response = HttpResponse::from_bytes(200, Vec::new());
        let result = pump(response, |_| Ok(Flow::Continue));
        assert!(matches!(result, Err(DownloadError::EmptyStream { .. })));
    }

    #[test]
    fn test_pump_stops_when_asked() {
        let response = HttpResponse::from_bytes(200, vec![1u8; 300_000]);
        let mut calls = 0;
        pump(response, |_| {
            calls += 1;
            Ok(Flow::Stop)
        })
        .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_pump_read_error_is_connection_failure() {
        let response = HttpResponse::new(200, FailingReader);
        let result = pump(response, |_| Ok(Flow::Continue));
        assert!(matches!(result, Err(DownloadError::Connection { .. })));
    }

    #[test]
    fn test_pump_observes_cancellation_during_stall() {
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            cancel_clone.cancel();
        });

        let started = Instant::now();
        let result = pump_body(
            "http://m/a",
            HttpResponse::new(200, StallingReader),
            &cancel,
            Duration::from_secs(30),
            |_| Ok(Flow::Continue),
        );

        assert!(matches!(result, Err(DownloadError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_pump_stall_timeout() {
        let result = pump_body(
            "http://m/a",
            HttpResponse::new(200, StallingReader),
            &CancellationToken::new(),
            Duration::from_millis(200),
            |_| Ok(Flow::Continue),
        );
        assert!(matches!(result, Err(DownloadError::Connection { .. })));
    }

    #[test]
    fn test_check_status() {
        assert!(check_status("u", &HttpResponse::from_bytes(200, "")).is_ok());
        assert!(check_status("u", &HttpResponse::from_bytes(206, "")).is_ok());
        assert!(matches!(
            check_status("u", &HttpResponse::from_bytes(404, "")),
            Err(DownloadError::NotFound { status: 404, .. })
        ));
        assert!(matches!(
            check_status("u", &HttpResponse::from_bytes(403, "")),
            Err(DownloadError::NotFound { status: 403, .. })
        ));
        assert!(matches!(
            check_status("u", &HttpResponse::from_bytes(503, "")),
            Err(DownloadError::ServerError { status: 503, .. })
        ));
    }

    #[test]
    fn test_wait_or_cancel() {
        let cancel = CancellationToken::new();
        assert!(wait_or_cancel(Duration::from_millis(20), &cancel).is_ok());

        cancel.cancel();
        assert!(matches!(
            wait_or_cancel(Duration::from_secs(60), &cancel),
            Err(DownloadError::Cancelled)
        ));
    }
}
