//! HTTP client abstraction for testability

use std::fmt;
use std::io::{self, Cursor, Read};
use std::time::Duration;

use thiserror::Error;

use crate::resource::ByteRange;

/// Default timeout for establishing a connection.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised before a response status is available.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HttpError {
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {reason}")]
    Connection { url: String, reason: String },
}

/// A response whose body has not been read yet.
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    body: Box<dyn Read + Send>,
}

impl HttpResponse {
    /// Wrap a status code and a streaming body.
    pub fn new(status: u16, body: impl Read + Send + 'static) -> Self {
        Self {
            status,
            body: Box::new(body),
        }
    }

    /// Build a response from an in-memory body.
    pub fn from_bytes(status: u16, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(status, Cursor::new(bytes.into()))
    }

    /// Whether the status is in the 2xx class.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the status is in the 4xx class.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Take the streaming body.
    pub fn into_body(self) -> Box<dyn Read + Send> {
        self.body
    }

    /// Read the whole body into memory.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.body.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Trait for HTTP client operations.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock HTTP clients in tests. Non-2xx statuses are returned as
/// responses, not errors, so callers can classify them.
pub trait HttpClient: Send + Sync {
    /// Performs an HTTP GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    /// * `range` - Optional byte range, sent as a `Range` header
    fn get(&self, url: &str, range: Option<ByteRange>) -> Result<HttpResponse, HttpError>;
}

/// Real HTTP client implementation using reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client for small request/response exchanges.
    ///
    /// The timeout covers the whole exchange, body included.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a client whose timeout covers the whole exchange.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    /// Creates a client for large streaming bodies.
    ///
    /// Only connecting is bounded by `connect_timeout`; body reads are not
    /// limited here because downloads watch for stalls themselves.
    pub fn streaming(connect_timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, range: Option<ByteRange>) -> Result<HttpResponse, HttpError> {
        let mut request = self.client.get(url);
        if let Some(value) = range.and_then(|r| r.to_header_value()) {
            request = request.header(reqwest::header::RANGE, value);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout {
                    url: url.to_string(),
                }
            } else {
                HttpError::Connection {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        Ok(HttpResponse::new(response.status().as_u16(), response))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock HTTP client serving canned responses by URL and recording calls.
    #[derive(Default)]
    pub struct MockHttpClient {
        responses: Mutex<HashMap<String, Vec<Result<(u16, Vec<u8>), HttpError>>>>,
        pub calls: Mutex<Vec<(String, Option<ByteRange>)>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for `url`; the last queued response repeats.
        pub fn respond(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push(Ok((status, body.into())));
        }

        pub fn fail(&self, url: &str, error: HttpError) {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push(Err(error));
        }

        pub fn requested_urls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(url, _)| url.clone())
                .collect()
        }
    }

    impl HttpClient for MockHttpClient {
        fn get(&self, url: &str, range: Option<ByteRange>) -> Result<HttpResponse, HttpError> {
            self.calls.lock().unwrap().push((url.to_string(), range));
            let mut responses = self.responses.lock().unwrap();
            let queue = responses.get_mut(url).ok_or_else(|| HttpError::Connection {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })?;
            let next = if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue[0].clone()
            };
            next.map(|(status, body)| HttpResponse::from_bytes(status, body))
        }
    }

    #[test]
    fn test_mock_client_success() {
        let mock = MockHttpClient::new();
        mock.respond("http://example.com", 200, vec![1, 2, 3, 4]);

        let response = mock.get("http://example.com", None).unwrap();
        assert!(response.is_success());
        assert_eq!(response.into_bytes().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_mock_client_unknown_url_fails() {
        let mock = MockHttpClient::new();
        assert!(matches!(
            mock.get("http://example.com", None),
            Err(HttpError::Connection { .. })
        ));
    }

    #[test]
    fn test_mock_client_queue_then_repeat() {
        let mock = MockHttpClient::new();
        mock.respond("http://a", 503, "");
        mock.respond("http://a", 200, "ok");

        assert_eq!(mock.get("http://a", None).unwrap().status, 503);
        assert_eq!(mock.get("http://a", None).unwrap().status, 200);
        assert_eq!(mock.get("http://a", None).unwrap().status, 200);
        assert_eq!(mock.requested_urls().len(), 3);
    }

    #[test]
    fn test_response_status_classes() {
        assert!(HttpResponse::from_bytes(206, "").is_success());
        assert!(!HttpResponse::from_bytes(301, "").is_success());
        assert!(HttpResponse::from_bytes(404, "").is_client_error());
        assert!(!HttpResponse::from_bytes(500, "").is_client_error());
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(ReqwestClient::new().is_ok());
        assert!(ReqwestClient::streaming(Duration::from_secs(5)).is_ok());
    }
}
