//! Network transport used by the downloader.
//!
//! The downloader only needs "GET this URL, give me status, headers and
//! bytes". [`Transport`] is that seam; [`HttpTransport`] is the reqwest-backed
//! implementation and tests substitute their own.

mod error;
mod http;

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

pub use error::{FetchError, parse_retry_after};
pub use http::{HttpTransport, HttpTransportOptions, TransportBuildError};

/// A single GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Absolute URL to fetch.
    pub url: Url,
    /// Extra request headers, sent in addition to the transport defaults.
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    /// Creates a request without extra headers.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
        }
    }

    /// Checks that every extra header can be put on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidHeader`] for the first header whose name
    /// or value is not valid HTTP.
    pub fn check_headers(&self) -> Result<(), FetchError> {
        for (name, value) in &self.headers {
            if encode_header(name, value).is_none() {
                return Err(FetchError::invalid_header(self.url.as_str(), name));
            }
        }
        Ok(())
    }
}

pub(crate) fn encode_header(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.trim().as_bytes()).ok()?;
    let value = HeaderValue::from_str(value.trim()).ok()?;
    Some((name, value))
}

/// A `200 OK` response, fully read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    /// URL that was requested.
    pub url: String,
    /// URL the body came from after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers with lowercase names, in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl FetchedResponse {
    /// Returns the first value of header `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the `Content-Type` header.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Issues network requests on behalf of the downloader.
///
/// Implementations must return `Err` for any status other than `200 OK` so
/// that error pages are never cached.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Performs one GET request.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError>;
}
