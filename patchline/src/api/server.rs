//! API server addresses.

use std::fmt;
use std::str::FromStr;

use reqwest::Url;

/// One API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiServer {
    pub host: String,
    /// Explicit port; `None` uses the scheme default.
    pub port: Option<u16>,
    pub use_https: bool,
}

impl ApiServer {
    /// HTTPS server on the default port.
    pub fn https(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            use_https: true,
        }
    }

    /// HTTP server on the default port.
    pub fn http(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            use_https: false,
        }
    }

    /// Use an explicit port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    fn default_port(&self) -> u16 {
        if self.use_https {
            443
        } else {
            80
        }
    }

    /// `scheme://host[:port]`, omitting the port when it is the default.
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        match self.port.filter(|p| *p != self.default_port()) {
            Some(port) => format!("{}://{}:{}", scheme, self.host, port),
            None => format!("{}://{}", scheme, self.host),
        }
    }

    /// Full URL of `path` with an optional query string.
    pub fn url(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/{}", self.base_url(), path.trim_start_matches('/'));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

impl fmt::Display for ApiServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

impl FromStr for ApiServer {
    type Err = String;

    /// Parse `https://host[:port]`, `http://host[:port]` or a bare host
    /// (HTTPS).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("server address is empty".to_string());
        }

        let with_scheme = if s.contains("://") {
            s.to_string()
        } else {
            format!("https://{}", s)
        };
        let url = Url::parse(&with_scheme).map_err(|e| format!("invalid server '{}': {}", s, e))?;

        let use_https = match url.scheme() {
            "https" => true,
            "http" => false,
            other => return Err(format!("unsupported scheme '{}' in '{}'", other, s)),
        };
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| format!("server '{}' has no host", s))?;

        Ok(Self {
            host: host.to_string(),
            port: url.port(),
            use_https,
        })
    }
}

/// Main server plus ordered fallback cache servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiServerSet {
    pub main: ApiServer,
    pub cache_servers: Vec<ApiServer>,
}

impl ApiServerSet {
    pub fn new(main: ApiServer) -> Self {
        Self {
            main,
            cache_servers: Vec::new(),
        }
    }

    /// Append a cache server.
    pub fn with_cache_server(mut self, server: ApiServer) -> Self {
        self.cache_servers.push(server);
        self
    }
}
