//! API client with main/cache server failover.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::error::{ApiError, ApiResult, ServerFailure};
use super::server::{ApiServer, ApiServerSet};
use crate::http::HttpClient;

/// A successful API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// URL that produced the response.
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Body as UTF-8 text.
    pub fn text(&self) -> ApiResult<&str> {
        std::str::from_utf8(&self.body).map_err(|e| ApiError::InvalidResponse {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    /// Deserialize the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::InvalidResponse {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }
}

/// Outcome of asking one server.
enum Attempt {
    Success(ApiResponse),
    Rejected { url: String, status: u16 },
    Failed(ServerFailure),
}

/// Metadata API client.
///
/// Each request goes to the main server first. Only when the main server
/// fails (5xx or no connection) are the cache servers asked, in order. The
/// client keeps no state between calls.
pub struct ApiClient {
    servers: ApiServerSet,
    http: Arc<dyn HttpClient>,
}

impl ApiClient {
    pub fn new(servers: ApiServerSet, http: Arc<dyn HttpClient>) -> Self {
        Self { servers, http }
    }

    /// Configured servers.
    pub fn servers(&self) -> &ApiServerSet {
        &self.servers
    }

    /// GET `path` with an optional query string.
    pub fn get_response(&self, path: &str, query: Option<&str>) -> ApiResult<ApiResponse> {
        debug!(path, query, "Getting API response");

        let mut main_errors = Vec::new();
        match self.try_server(&self.servers.main, path, query, true) {
            Attempt::Success(response) => return Ok(response),
            Attempt::Rejected { url, status } => return Err(ApiError::Client { url, status }),
            Attempt::Failed(failure) => {
                warn!(error = %failure, "Main API server failed, trying cache servers");
                main_errors.push(failure);
            }
        }

        let mut cache_errors = Vec::new();
        for server in &self.servers.cache_servers {
            match self.try_server(server, path, query, false) {
                Attempt::Success(response) => return Ok(response),
                Attempt::Failed(failure) => {
                    warn!(error = %failure, "Cache API server failed");
                    cache_errors.push(failure);
                }
                Attempt::Rejected { url, status } => {
                    cache_errors.push(ServerFailure::ServerError { url, status });
                }
            }
        }

        Err(ApiError::AllServersFailed {
            main_errors,
            cache_errors,
        })
    }

    /// GET `path` and deserialize the JSON body.
    pub fn get_json<T: DeserializeOwned>(&self, path: &str, query: Option<&str>) -> ApiResult<T> {
        self.get_response(path, query)?.json()
    }

    fn try_server(
        &self,
        server: &ApiServer,
        path: &str,
        query: Option<&str>,
        main: bool,
    ) -> Attempt {
        let url = server.url(path, query);
        debug!(url = %url, main, "Trying API server");

        let response = match self.http.get(&url, None) {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Failed(ServerFailure::Connection {
                    url,
                    reason: e.to_string(),
                })
            }
        };

        let status = response.status;
        // Main server: any 2xx counts. Cache servers: only 200.
        let accepted = if main {
            response.is_success()
        } else {
            status == 200
        };

        if accepted {
            return match response.into_bytes() {
                Ok(body) => Attempt::Success(ApiResponse { url, status, body }),
                Err(e) => Attempt::Failed(ServerFailure::Connection {
                    url,
                    reason: format!("failed to read body: {}", e),
                }),
            };
        }

        if main && !(500..600).contains(&status) {
            return Attempt::Rejected { url, status };
        }
        Attempt::Failed(ServerFailure::ServerError { url, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::MockHttpClient;
    use crate::http::HttpError;

    const PATH: &str = "1/apps/secret/versions/latest/id";

    fn servers() -> ApiServerSet {
        ApiServerSet::new(ApiServer::https("main"))
            .with_cache_server(ApiServer::http("cache1"))
            .with_cache_server(ApiServer::http("cache2"))
    }

    fn url(host: &str, https: bool) -> String {
        let server = if https {
            ApiServer::https(host)
        } else {
            ApiServer::http(host)
        };
        server.url(PATH, None)
    }

    #[test]
    fn test_main_success_skips_cache() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(&url("main", true), 200, r#"{"id":7}"#);

        let client = ApiClient::new(servers(), http.clone());
        let response = client.get_response(PATH, None).unwrap();

        assert_eq!(response.text().unwrap(), r#"{"id":7}"#);
        assert_eq!(http.requested_urls(), vec![url("main", true)]);
    }

    #[test]
    fn test_main_any_2xx_is_success() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(&url("main", true), 203, "{}");

        let client = ApiClient::new(servers(), http.clone());
        assert_eq!(client.get_response(PATH, None).unwrap().status, 203);
        assert_eq!(http.requested_urls().len(), 1);
    }

    #[test]
    fn test_main_client_error_is_final() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(&url("main", true), 404, "");
        http.respond(&url("cache1", false), 200, "{}");

        let client = ApiClient::new(servers(), http.clone());
        let result = client.get_response(PATH, None);

        assert!(matches!(result, Err(ApiError::Client { status: 404, .. })));
        assert_eq!(http.requested_urls(), vec![url("main", true)]);
    }

    #[test]
    fn test_main_server_error_falls_back_to_cache() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(&url("main", true), 503, "");
        http.respond(&url("cache1", false), 500, "");
        http.respond(&url("cache2", false), 200, r#"{"id":9}"#);

        let client = ApiClient::new(servers(), http.clone());
        let response = client.get_response(PATH, None).unwrap();

        assert_eq!(response.url, url("cache2", false));
        assert_eq!(
            http.requested_urls(),
            vec![url("main", true), url("cache1", false), url("cache2", false)]
        );
    }

    #[test]
    fn test_cache_non_200_success_is_skipped() {
        let http = Arc::new(MockHttpClient::new());
        http.fail(
            &url("main", true),
            HttpError::Timeout {
                url: url("main", true),
            },
        );
        http.respond(&url("cache1", false), 204, "");
        http.respond(&url("cache2", false), 200, "{}");

        let client = ApiClient::new(servers(), http.clone());
        assert_eq!(client.get_response(PATH, None).unwrap().url, url("cache2", false));
    }

    #[test]
    fn test_all_servers_failed_reports_each() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(&url("main", true), 502, "");
        http.respond(&url("cache1", false), 404, "");

        let client = ApiClient::new(servers(), http.clone());
        match client.get_response(PATH, None) {
            Err(ApiError::AllServersFailed {
                main_errors,
                cache_errors,
            }) => {
                assert_eq!(main_errors.len(), 1);
                assert_eq!(cache_errors.len(), 2);
                assert!(matches!(
                    cache_errors[1],
                    ServerFailure::Connection { .. }
                ));
            }
            other => panic!("Expected AllServersFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_query_is_appended() {
        let http = Arc::new(MockHttpClient::new());
        let expected = ApiServer::https("main").url(PATH, Some("key_secret=abc"));
        http.respond(&expected, 200, "{}");

        let client = ApiClient::new(servers(), http.clone());
        client.get_response(PATH, Some("key_secret=abc")).unwrap();
        assert_eq!(http.requested_urls(), vec![expected]);
    }

    #[test]
    fn test_get_json_invalid_body() {
        let http = Arc::new(MockHttpClient::new());
        http.respond(&url("main", true), 200, "not json");

        let client = ApiClient::new(servers(), http);
        let result: ApiResult<serde_json::Value> = client.get_json(PATH, None);
        assert!(matches!(result, Err(ApiError::InvalidResponse { .. })));
    }
}
