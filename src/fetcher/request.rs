//! What a caller asks for and what it gets back.

use std::time::{Duration, SystemTime};

use crate::cache::ContentKind;
use crate::html::HtmlDocument;

/// How the body of a fetched resource is presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Parse when the response was served as HTML.
    #[default]
    Auto,
    /// Always parse as HTML.
    Html,
    /// Never parse; return bytes.
    Raw,
}

/// One resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Absolute URL.
    pub url: String,
    /// Extra request headers. They change what the server returns, so they are
    /// part of the cache key.
    pub params: Vec<(String, String)>,
    /// Overrides the downloader's staleness threshold for this request.
    pub stale_after: Option<Duration>,
    /// Body presentation.
    pub mode: ParseMode,
}

impl Request {
    /// Creates a request with no parameters and default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
            stale_after: None,
            mode: ParseMode::Auto,
        }
    }

    /// Adds a request header.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Sets the staleness threshold for this request only.
    #[must_use]
    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = Some(stale_after);
        self
    }

    /// Sets the parse mode.
    #[must_use]
    pub fn mode(mut self, mode: ParseMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Served from a fresh cache entry; no network traffic.
    Cache,
    /// Fetched over the network (and now cached).
    Network,
}

/// Body of a fetched resource.
#[derive(Debug, Clone)]
pub enum Body {
    /// Parsed document with absolute links.
    Html(HtmlDocument),
    /// Raw bytes.
    Raw(Vec<u8>),
}

/// A fetched resource.
///
/// HTML bodies hold a reference-counted tree, so `Fetched` is not `Send`.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Cache or network.
    pub origin: Origin,
    /// URL that was requested.
    pub url: String,
    /// URL after redirects; links were resolved against it.
    pub final_url: String,
    /// When the underlying network response was received.
    pub fetched_at: SystemTime,
    /// Kind derived from the response's `Content-Type`.
    pub content_kind: ContentKind,
    /// The response's `Content-Type`, if any.
    pub content_type: Option<String>,
    /// The body.
    pub body: Body,
}

impl Fetched {
    /// Whether the result was served from the cache.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.origin == Origin::Cache
    }

    /// The parsed document, if the body was parsed.
    #[must_use]
    pub fn html(&self) -> Option<&HtmlDocument> {
        match &self.body {
            Body::Html(document) => Some(document),
            Body::Raw(_) => None,
        }
    }

    /// The raw bytes, if the body was not parsed.
    #[must_use]
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Raw(bytes) => Some(bytes),
            Body::Html(_) => None,
        }
    }

    /// Consumes the result, returning raw bytes or serialized HTML.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self.body {
            Body::Raw(bytes) => bytes,
            Body::Html(document) => document.to_html().into_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_methods() {
        let request = Request::new("https://example.com/")
            .param("Accept-Language", "el")
            .stale_after(Duration::from_secs(5))
            .mode(ParseMode::Raw);

        assert_eq!(request.params, vec![("Accept-Language".to_string(), "el".to_string())]);
        assert_eq!(request.stale_after, Some(Duration::from_secs(5)));
        assert_eq!(request.mode, ParseMode::Raw);
        assert_eq!(Request::new("x").mode, ParseMode::Auto);
    }

    #[test]
    fn test_fetched_accessors() {
        let fetched = Fetched {
            origin: Origin::Cache,
            url: "https://example.com/a.bin".to_string(),
            final_url: "https://example.com/a.bin".to_string(),
            fetched_at: SystemTime::UNIX_EPOCH,
            content_kind: ContentKind::Binary,
            content_type: None,
            body: Body::Raw(vec![1, 2, 3]),
        };

        assert!(fetched.is_cached());
        assert!(fetched.html().is_none());
        assert_eq!(fetched.bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!(fetched.into_bytes(), vec![1, 2, 3]);
    }
}
