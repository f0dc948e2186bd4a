//! Cache-aware, throttled resource fetching.
//!
//! [`Downloader`] ties the pieces together. For each request it:
//!
//! 1. derives the [`CacheKey`] and looks the key up in the cache
//! 2. serves a fresh entry directly, with no network traffic and no throttling
//! 3. otherwise waits out the throttle, fetches, and runs the ban detector
//! 4. stores the response (unless banned) and returns it, parsing HTML and
//!    absolutizing its links when asked to
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use fetcher_core::fetcher::{Downloader, Request};
//! use fetcher_core::throttle::ThrottleBounds;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bounds = ThrottleBounds::new(Duration::from_secs(1), Duration::from_secs(3))?;
//! let downloader = Downloader::builder("cache.sqlite", bounds)
//!     .stale_after(Duration::from_secs(3600))
//!     .ban_detector(|r: &fetcher_core::transport::FetchedResponse| r.body_text().contains("captcha"))
//!     .build()
//!     .await?;
//!
//! let page = downloader.open(&Request::new("https://example.com/")).await?;
//! if let Some(document) = page.html() {
//!     for link in document.links() {
//!         println!("{link}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod builder;
mod error;
mod request;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::ban::BanDetector;
use crate::cache::{
    CacheEntry, CacheError, CacheKey, CacheStore, ContentKind, assess, truncate_to_millis,
};
use crate::clock::Clock;
use crate::html;
use crate::throttle::{Throttle, ThrottleBounds};
use crate::transport::{FetchError, FetchRequest, Transport};

pub use builder::DownloaderBuilder;
pub use error::{BannedError, BuildError, Error};
pub use request::{Body, Fetched, Origin, ParseMode, Request};

/// Staleness threshold used when none is configured (one day).
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Polite, cache-aware fetcher.
///
/// `Downloader` is `Send + Sync`; share it behind an `Arc` to fetch from
/// several tasks. All of them are paced by the same throttle.
pub struct Downloader {
    cache: CacheStore,
    throttle: Throttle,
    transport: Arc<dyn Transport>,
    ban_detector: Option<Arc<dyn BanDetector>>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
}

impl fmt::Debug for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downloader")
            .field("throttle", &self.throttle)
            .field("transport", &self.transport)
            .field("ban_detector", &self.ban_detector.is_some())
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}

impl Downloader {
    /// Starts configuring a downloader caching to `cache_path`.
    #[must_use]
    pub fn builder(cache_path: impl Into<PathBuf>, bounds: ThrottleBounds) -> DownloaderBuilder {
        DownloaderBuilder::new(cache_path.into(), bounds)
    }

    /// The request throttle.
    #[must_use]
    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// The response cache.
    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Default staleness threshold.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Fetches a resource, from the cache when a fresh entry exists.
    ///
    /// # Errors
    ///
    /// - [`Error::Fetch`] for malformed URLs, network failures and
    ///   non-success statuses
    /// - [`Error::Banned`] / [`Error::Detector`] when the ban detector
    ///   rejects the response or fails
    /// - [`Error::CacheUnavailable`] / [`Error::Codec`] for cache faults
    ///
    /// Nothing is cached when an error is returned after the network request.
    #[instrument(skip(self, request), fields(url = %request.url, mode = ?request.mode))]
    pub async fn open(&self, request: &Request) -> Result<Fetched, Error> {
        let url = Url::parse(&request.url).map_err(|_| FetchError::invalid_url(&request.url))?;
        let key = CacheKey::from_url(&url, &request.params);
        let stale_after = request.stale_after.unwrap_or(self.stale_after);

        let cached = self.cache.get(&key).await?;
        let freshness = assess(cached.as_ref(), self.clock.now(), stale_after);

        let (entry, origin) = match cached {
            Some(entry) if !freshness.needs_network() => {
                debug!(key = %key, "serving fresh cache entry");
                (entry, Origin::Cache)
            }
            _ => {
                debug!(key = %key, ?freshness, "going to network");
                let entry = self.fetch_and_store(&url, key, &request.params).await?;
                (entry, Origin::Network)
            }
        };

        present(entry, origin, request.mode)
    }

    /// Fetches a resource as raw bytes, never parsing it.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, Error> {
        let fetched = self.open(&Request::new(url).mode(ParseMode::Raw)).await?;
        Ok(fetched.into_bytes())
    }

    /// Fetches a resource and parses it as HTML whatever its content type.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub async fn fetch_html(&self, url: &str) -> Result<Fetched, Error> {
        self.open(&Request::new(url).mode(ParseMode::Html)).await
    }

    /// Removes the cached entry for `url` (requested without params).
    ///
    /// Returns whether an entry existed.
    ///
    /// # Errors
    ///
    /// [`Error::Fetch`] for a malformed URL, [`Error::CacheUnavailable`] on
    /// storage faults.
    #[instrument(skip(self))]
    pub async fn evict(&self, url: &str) -> Result<bool, Error> {
        let key = CacheKey::derive(url, &[]).map_err(|_| FetchError::invalid_url(url))?;
        let removed = self.cache.remove(&key).await?;
        debug!(removed, "evicted");
        Ok(removed)
    }

    async fn fetch_and_store(
        &self,
        url: &Url,
        key: CacheKey,
        params: &[(String, String)],
    ) -> Result<CacheEntry, Error> {
        let mut fetch_request = FetchRequest::new(url.clone());
        fetch_request.headers = params.to_vec();
        fetch_request.check_headers()?;

        let outcome = self.throttle.wait_then_mark().await;
        debug!(
            delay_ms = outcome.delay.as_millis(),
            waited_ms = outcome.waited.as_millis(),
            "throttle passed"
        );

        let response = self.transport.fetch(&fetch_request).await?;

        if let Some(detector) = &self.ban_detector {
            let banned = detector.is_banned(&response).map_err(Error::Detector)?;
            if banned {
                warn!(final_url = %response.final_url, "ban detected, response not cached");
                return Err(BannedError { response }.into());
            }
        }

        let content_type = response.content_type().map(str::to_string);
        let entry = CacheEntry {
            key,
            url: url.to_string(),
            final_url: response.final_url,
            payload: response.body,
            fetched_at: truncate_to_millis(self.clock.now()),
            content_kind: ContentKind::from_content_type(content_type.as_deref()),
            content_type,
        };
        self.cache.put(&entry).await?;

        info!(
            bytes = entry.payload.len(),
            kind = entry.content_kind.as_str(),
            "fetched and cached"
        );
        Ok(entry)
    }
}

/// Builds the caller-facing result. Runs after every await so the
/// reference-counted HTML tree never lives across a suspension point.
fn present(entry: CacheEntry, origin: Origin, mode: ParseMode) -> Result<Fetched, Error> {
    let parse = match mode {
        ParseMode::Auto => entry.content_kind == ContentKind::Html,
        ParseMode::Html => true,
        ParseMode::Raw => false,
    };

    let body = if parse {
        let base = Url::parse(&entry.final_url)
            .or_else(|_| Url::parse(&entry.url))
            .map_err(|_| {
                Error::CacheUnavailable(CacheError::Corrupt {
                    key: entry.key.to_string(),
                    reason: format!("unparseable final URL {:?}", entry.final_url),
                })
            })?;
        Body::Html(html::parse_lenient(&entry.payload, &base))
    } else {
        Body::Raw(entry.payload)
    };

    Ok(Fetched {
        origin,
        url: entry.url,
        final_url: entry.final_url,
        fetched_at: entry.fetched_at,
        content_kind: entry.content_kind,
        content_type: entry.content_type,
        body,
    })
}
