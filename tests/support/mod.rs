//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fetcher_core::clock::ManualClock;
use fetcher_core::throttle::{FixedSampler, ThrottleBounds};
use fetcher_core::{Downloader, DownloaderBuilder};
use tempfile::TempDir;
use wiremock::ResponseTemplate;

/// Fixed start time for manual clocks.
pub const T0: Duration = Duration::from_secs(1_700_000_000);

/// A temp directory and a cache path inside it. Keep the directory alive.
pub fn temp_cache() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("cache.sqlite");
    (temp_dir, path)
}

/// A manual clock at [`T0`].
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(SystemTime::UNIX_EPOCH + T0))
}

/// Builder with no throttling and a manual clock.
pub fn quick_builder(cache_path: &PathBuf, clock: Arc<ManualClock>) -> DownloaderBuilder {
    Downloader::builder(cache_path, ThrottleBounds::none()).clock(clock)
}

/// Builder whose throttle always waits exactly `delay_ms` (within `[min, max)`).
pub fn fixed_throttle_builder(
    cache_path: &PathBuf,
    clock: Arc<ManualClock>,
    min_ms: u64,
    max_ms: u64,
    delay_ms: u64,
) -> DownloaderBuilder {
    let bounds = ThrottleBounds::from_millis(min_ms, max_ms).expect("valid bounds");
    Downloader::builder(cache_path, bounds)
        .clock(clock)
        .sampler(Arc::new(FixedSampler(Duration::from_millis(delay_ms))))
}

/// A `200 OK` HTML response.
pub fn html_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

/// A `200 OK` binary response.
pub fn binary_response(body: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "application/octet-stream")
        .set_body_bytes(body.to_vec())
}
