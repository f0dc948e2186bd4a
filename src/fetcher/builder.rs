//! Construction of [`Downloader`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use super::{BuildError, DEFAULT_STALE_AFTER, Downloader};
use crate::ban::BanDetector;
use crate::cache::CacheStore;
use crate::clock::{Clock, SystemClock};
use crate::throttle::{DelaySampler, Throttle, ThrottleBounds, UniformSampler};
use crate::transport::{HttpTransport, HttpTransportOptions, Transport};

/// Configures and opens a [`Downloader`].
///
/// Created with [`Downloader::builder`].
pub struct DownloaderBuilder {
    cache_path: PathBuf,
    bounds: ThrottleBounds,
    stale_after: Duration,
    ban_detector: Option<Arc<dyn BanDetector>>,
    transport: Option<Arc<dyn Transport>>,
    transport_options: HttpTransportOptions,
    sampler: Arc<dyn DelaySampler>,
    clock: Arc<dyn Clock>,
    cache_store: Option<CacheStore>,
}

impl fmt::Debug for DownloaderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloaderBuilder")
            .field("cache_path", &self.cache_path)
            .field("bounds", &self.bounds)
            .field("stale_after", &self.stale_after)
            .field("ban_detector", &self.ban_detector.is_some())
            .field("transport", &self.transport)
            .field("transport_options", &self.transport_options)
            .finish_non_exhaustive()
    }
}

impl DownloaderBuilder {
    pub(super) fn new(cache_path: PathBuf, bounds: ThrottleBounds) -> Self {
        Self {
            cache_path,
            bounds,
            stale_after: DEFAULT_STALE_AFTER,
            ban_detector: None,
            transport: None,
            transport_options: HttpTransportOptions::default(),
            sampler: Arc::new(UniformSampler),
            clock: Arc::new(SystemClock),
            cache_store: None,
        }
    }

    /// Default staleness threshold (one day unless set).
    #[must_use]
    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Installs a ban detector run against every network response.
    #[must_use]
    pub fn ban_detector(mut self, detector: impl BanDetector + 'static) -> Self {
        self.ban_detector = Some(Arc::new(detector));
        self
    }

    /// Replaces the HTTP transport. Header, user agent and timeout settings
    /// are then ignored.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the throttle's delay source.
    #[must_use]
    pub fn sampler(mut self, sampler: Arc<dyn DelaySampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Replaces the wall clock used for cache timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds a header sent with every request. Not part of the cache key.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.transport_options
            .default_headers
            .push((name.into(), value.into()));
        self
    }

    /// Overrides the User-Agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.transport_options.user_agent = user_agent.into();
        self
    }

    /// Sets connect and read timeouts.
    #[must_use]
    pub fn timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.transport_options.connect_timeout = connect;
        self.transport_options.read_timeout = read;
        self
    }

    /// Keeps cookies between requests.
    #[must_use]
    pub fn cookie_store(mut self, enabled: bool) -> Self {
        self.transport_options.cookie_store = enabled;
        self
    }

    /// Uses an already open cache instead of opening `cache_path`.
    #[must_use]
    pub fn cache_store(mut self, store: CacheStore) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Opens the cache and builds the transport.
    ///
    /// # Errors
    ///
    /// - [`BuildError::Cache`] if the cache file cannot be opened
    /// - [`BuildError::Transport`] if the HTTP client cannot be configured
    #[instrument(skip(self), fields(cache = %self.cache_path.display()))]
    pub async fn build(self) -> Result<Downloader, BuildError> {
        let cache = match self.cache_store {
            Some(store) => store,
            None => CacheStore::open(&self.cache_path).await?,
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::with_options(&self.transport_options)?),
        };

        debug!(
            stale_after_secs = self.stale_after.as_secs(),
            min_ms = self.bounds.min().as_millis(),
            max_ms = self.bounds.max().as_millis(),
            "downloader ready"
        );

        Ok(Downloader {
            cache,
            throttle: Throttle::with_sampler(self.bounds, self.sampler),
            transport,
            ban_detector: self.ban_detector,
            clock: self.clock,
            stale_after: self.stale_after,
        })
    }
}
