//! reqwest-backed transport.
//!
//! The client is built once and reused, taking advantage of connection pooling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use thiserror::Error;
use tracing::{debug, instrument};

use super::{FetchError, FetchRequest, FetchedResponse, Transport, encode_header};
use crate::user_agent;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Errors raised while building an [`HttpTransport`].
#[derive(Debug, Error)]
pub enum TransportBuildError {
    /// A default header could not be encoded.
    #[error("invalid default header {0:?}")]
    InvalidHeader(String),

    /// reqwest rejected the client configuration.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportOptions {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Whole-request timeout, including reading the body.
    pub read_timeout: Duration,
    /// User-Agent header.
    pub user_agent: String,
    /// Headers sent with every request; per-request headers win on conflict.
    pub default_headers: Vec<(String, String)>,
    /// Keep cookies set by servers for later requests.
    pub cookie_store: bool,
}

impl Default for HttpTransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            user_agent: user_agent::default_user_agent().to_string(),
            default_headers: Vec::new(),
            cookie_store: false,
        }
    }
}

/// HTTP transport built on a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with default options.
    ///
    /// # Errors
    ///
    /// Returns [`TransportBuildError::Client`] if the TLS backend cannot be
    /// initialised.
    pub fn new() -> Result<Self, TransportBuildError> {
        Self::with_options(&HttpTransportOptions::default())
    }

    /// Creates a transport with explicit options.
    ///
    /// # Errors
    ///
    /// Returns [`TransportBuildError::InvalidHeader`] for unencodable default
    /// headers, or [`TransportBuildError::Client`] if reqwest rejects the
    /// configuration.
    #[instrument(level = "debug", skip(options), fields(
        connect_timeout_secs = options.connect_timeout.as_secs(),
        read_timeout_secs = options.read_timeout.as_secs(),
    ))]
    pub fn with_options(options: &HttpTransportOptions) -> Result<Self, TransportBuildError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &options.default_headers {
            let (name, value) = encode_header(name, value)
                .ok_or_else(|| TransportBuildError::InvalidHeader(name.clone()))?;
            default_headers.insert(name, value);
        }

        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.read_timeout)
            .gzip(true)
            .user_agent(options.user_agent.as_str())
            .default_headers(default_headers)
            .cookie_store(options.cookie_store)
            .build()?;

        debug!("built HTTP transport");
        Ok(Self { client })
    }

    /// Returns the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, request), fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
        let url = request.url.as_str();

        let mut builder = self.client.get(request.url.clone());
        for (name, value) in &request.headers {
            let (header_name, header_value) =
                encode_header(name, value).ok_or_else(|| FetchError::invalid_header(url, name))?;
            builder = builder.header(header_name, header_value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        let final_url = response.url().to_string();

        // Only 200 OK is cacheable.
        if status != StatusCode::OK {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(std::string::ToString::to_string);
            debug!(status = status.as_u16(), "status other than 200 OK");
            return Err(FetchError::http_status_with_retry_after(
                url,
                status.as_u16(),
                retry_after,
            ));
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::body(url, e)
            }
        })?;

        debug!(
            status = status.as_u16(),
            bytes = body.len(),
            final_url = %final_url,
            "response received"
        );

        Ok(FetchedResponse {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            headers,
            body: body.to_vec(),
        })
    }
}
