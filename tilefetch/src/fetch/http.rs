//! HTTP fetch executor backed by reqwest.

use bytes::Bytes;
use reqwest::StatusCode;
use tracing::{debug, trace, warn};

use super::types::{FetchError, FetchExecutor, FetchRequest};

/// Default request timeout (seconds).
///
/// The scheduler imposes no timeout of its own; stalled fetches fail through
/// this transport timeout and then go through the normal retry path.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default User-Agent string for HTTP requests.
///
/// Volunteer-run tile servers (OpenStreetMap in particular) reject requests
/// without an identifying User-Agent.
pub const DEFAULT_USER_AGENT: &str = concat!("tilefetch/", env!("CARGO_PKG_VERSION"));

/// Configuration for [`HttpFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Request timeout in seconds
    timeout_secs: u64,
    /// User-Agent header value
    user_agent: String,
    /// Origin header sent on cross-origin requests
    origin: Option<String>,
}

impl HttpConfig {
    /// Create a new HTTP configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout in seconds.
    pub fn with_timeout_secs(mut self, timeout: u64) -> Self {
        self.timeout_secs = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the Origin header sent with cross-origin requests.
    pub fn with_origin(mut self, origin: Option<String>) -> Self {
        self.origin = origin;
        self
    }

    /// Get the request timeout in seconds.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Get the User-Agent header value.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Get the configured Origin, if any.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            origin: None,
        }
    }
}

/// Async HTTP executor.
///
/// One call to [`FetchExecutor::fetch`] issues exactly one GET request.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Option<String>,
}

impl HttpFetcher {
    /// Creates a fetcher with default configuration.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(&HttpConfig::default())
    }

    /// Creates a fetcher with the given configuration.
    pub fn with_config(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs()))
            .user_agent(config.user_agent())
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            origin: config.origin.clone(),
        })
    }
}

/// Maps a non-success status to a fetch error.
fn status_error(status: StatusCode, request: &FetchRequest) -> FetchError {
    if status == StatusCode::FORBIDDEN && request.is_cross_origin() {
        return FetchError::CrossOrigin(format!("HTTP {} from {}", status, request.url()));
    }

    FetchError::Http {
        status: status.as_u16(),
        url: request.url().to_string(),
    }
}

impl FetchExecutor for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Bytes, FetchError> {
        let url = request.url();
        trace!(url = url, cross_origin = request.is_cross_origin(), "HTTP GET request starting");

        let mut builder = self.client.get(url);
        if request.is_cross_origin() {
            if let Some(origin) = &self.origin {
                builder = builder.header(reqwest::header::ORIGIN, origin.as_str());
            }
        }

        let response = match builder.send().await {
            Ok(resp) => {
                debug!(
                    url = url,
                    status = resp.status().as_u16(),
                    "HTTP response received"
                );
                resp
            }
            Err(e) => {
                warn!(
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                return Err(FetchError::Network(format!("Request failed: {}", e)));
            }
        };

        if !response.status().is_success() {
            warn!(
                url = url,
                status = response.status().as_u16(),
                "HTTP error status"
            );
            return Err(status_error(response.status(), request));
        }

        match response.bytes().await {
            Ok(bytes) => {
                trace!(url = url, bytes = bytes.len(), "HTTP response body read");
                Ok(bytes)
            }
            Err(e) => {
                warn!(url = url, error = %e, "Failed to read response body");
                Err(FetchError::Network(format!(
                    "Failed to read response: {}",
                    e
                )))
            }
        }
    }
}
