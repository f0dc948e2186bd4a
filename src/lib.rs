//! Fetcher Core Library
//!
//! Polite, cache-aware HTTP resource fetching for scrapers. Responses are kept
//! in a compressed SQLite cache and only refetched once older than a
//! caller-chosen threshold. Network requests are spaced by a random delay
//! drawn afresh each time, and a caller-supplied detector can reject ban pages
//! before they are cached. HTML is parsed leniently with every link made
//! absolute.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetcher`] - The [`Downloader`] tying everything together
//! - [`cache`] - Disk cache, cache keys, staleness policy and payload codec
//! - [`throttle`] - Randomized request pacing
//! - [`ban`] - Ban detection hook
//! - [`transport`] - HTTP transport (reqwest) behind a trait
//! - [`html`] - Lenient HTML parsing with link absolutization
//! - [`db`] - Database connection and schema management
//! - [`config`] - TOML configuration file
//! - [`clock`] - Injectable wall clock

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ban;
pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod fetcher;
pub mod html;
pub mod throttle;
pub mod transport;
pub mod user_agent;

// Re-export commonly used types
pub use ban::{BanDetector, BodyContains};
pub use cache::{CacheEntry, CacheError, CacheKey, CacheStore, ContentKind, Freshness};
pub use config::{ConfigError, FetcherConfig};
pub use db::Database;
pub use fetcher::{
    BannedError, Body, BuildError, DEFAULT_STALE_AFTER, Downloader, DownloaderBuilder, Error,
    Fetched, Origin, ParseMode, Request,
};
pub use html::{HtmlDocument, parse_lenient};
pub use throttle::{Throttle, ThrottleBounds};
pub use transport::{FetchError, FetchedResponse, HttpTransport, Transport};
