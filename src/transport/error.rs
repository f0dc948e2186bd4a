//! Error types for the transport layer.
//!
//! Every network-level failure (connection, timeout, non-success status)
//! becomes a [`FetchError`]. None of them are cached.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Maximum Retry-After value honoured (1 hour).
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Errors that can occur while fetching a resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present.
        retry_after: Option<String>,
    },

    /// Reading the response body failed midway.
    #[error("failed to read response body from {url}: {source}")]
    Body {
        /// The URL whose body could not be read.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The provided URL is malformed or not absolute.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// A header name or value could not be sent.
    #[error("invalid request header {name:?} for {url}")]
    InvalidHeader {
        /// The URL being requested.
        url: String,
        /// The offending header name.
        name: String,
    },

    /// Failure reported by a custom transport.
    #[error("transport failure fetching {url}: {message}")]
    Other {
        /// The URL being requested.
        url: String,
        /// Description of the failure.
        message: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a body read error.
    pub fn body(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Body {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self::InvalidHeader {
            url: url.into(),
            name: name.into(),
        }
    }

    /// Creates an error for a custom transport.
    pub fn other(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            url: url.into(),
            message: message.into(),
        }
    }

    /// HTTP status code, for status errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-requested wait before retrying, parsed from Retry-After.
    ///
    /// Retry policy is left to the caller; this only interprets the header.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::HttpStatus {
                retry_after: Some(value),
                ..
            } => parse_retry_after(value),
            _ => None,
        }
    }
}

/// Parses a Retry-After header value into a Duration.
///
/// Supports two formats as per RFC 7231:
/// - Integer seconds: `Retry-After: 120`
/// - HTTP-date: `Retry-After: Wed, 21 Oct 2025 07:28:00 GMT`
///
/// Returns `None` if the value cannot be parsed. Caps excessive values at 1 hour.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fetcher_core::transport::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        let duration = Duration::from_secs(seconds);
        if duration > MAX_RETRY_AFTER {
            warn!(seconds, "Retry-After exceeds maximum, capping at 1 hour");
            return Some(MAX_RETRY_AFTER);
        }
        return Some(duration);
    }

    let Ok(datetime) = httpdate::parse_http_date(header_value) else {
        debug!(header_value, "unparseable Retry-After value");
        return None;
    };

    match datetime.duration_since(std::time::SystemTime::now()) {
        Ok(duration) if duration > MAX_RETRY_AFTER => {
            warn!(
                delay_secs = duration.as_secs(),
                "Retry-After date exceeds maximum, capping at 1 hour"
            );
            Some(MAX_RETRY_AFTER)
        }
        Ok(duration) => Some(duration),
        Err(_) => Some(Duration::ZERO),
    }
}
