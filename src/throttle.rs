//! Randomized pacing of network requests.
//!
//! This module provides the [`Throttle`] struct which keeps consecutive network
//! requests of one downloader apart by a delay drawn afresh, uniformly from
//! [`ThrottleBounds`], before every request. Irregular gaps make the traffic
//! harder to fingerprint than a fixed cadence.
//!
//! # Overview
//!
//! Pacing is scoped to one `Throttle` (one downloader). Cache hits never reach
//! the throttle. The first request proceeds immediately.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use fetcher_core::throttle::{Throttle, ThrottleBounds};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bounds = ThrottleBounds::new(Duration::from_secs(1), Duration::from_secs(3))?;
//! let throttle = Throttle::new(bounds);
//!
//! // First request proceeds immediately
//! throttle.wait_then_mark().await;
//!
//! // Second request waits 1-3 seconds after the first
//! throttle.wait_then_mark().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Invalid throttle bounds.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("throttle minimum {min:?} exceeds maximum {max:?}")]
pub struct ThrottleBoundsError {
    /// Requested minimum.
    pub min: Duration,
    /// Requested maximum.
    pub max: Duration,
}

/// Range a throttle delay is drawn from: `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleBounds {
    min: Duration,
    max: Duration,
}

impl ThrottleBounds {
    /// Creates bounds, rejecting `min > max`.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleBoundsError`] when `min > max`.
    pub fn new(min: Duration, max: Duration) -> Result<Self, ThrottleBoundsError> {
        if min > max {
            return Err(ThrottleBoundsError { min, max });
        }
        Ok(Self { min, max })
    }

    /// Creates bounds from milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleBoundsError`] when `min_ms > max_ms`.
    pub fn from_millis(min_ms: u64, max_ms: u64) -> Result<Self, ThrottleBoundsError> {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    /// Bounds that never delay.
    #[must_use]
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Lower bound (inclusive).
    #[must_use]
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound (exclusive unless equal to `min`).
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Whether `delay` could have been drawn from these bounds.
    #[must_use]
    pub fn contains(&self, delay: Duration) -> bool {
        if self.min == self.max {
            delay == self.min
        } else {
            delay >= self.min && delay < self.max
        }
    }
}

/// Source of throttle delays.
pub trait DelaySampler: Send + Sync + fmt::Debug {
    /// Draws one delay from `bounds`.
    ///
    /// Implementations must return a value in `[min, max)`, or exactly `min`
    /// when the bounds are degenerate.
    fn sample(&self, bounds: &ThrottleBounds) -> Duration;
}

/// Uniform draw from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformSampler;

impl DelaySampler for UniformSampler {
    fn sample(&self, bounds: &ThrottleBounds) -> Duration {
        if bounds.min >= bounds.max {
            return bounds.min;
        }
        rand::thread_rng().gen_range(bounds.min..bounds.max)
    }
}

/// Uniform draw from a seeded RNG; reproducible across runs.
#[derive(Debug)]
pub struct SeededSampler {
    rng: std::sync::Mutex<StdRng>,
}

impl SeededSampler {
    /// Creates a sampler with a fixed seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: std::sync::Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl DelaySampler for SeededSampler {
    fn sample(&self, bounds: &ThrottleBounds) -> Duration {
        if bounds.min >= bounds.max {
            return bounds.min;
        }
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(bounds.min..bounds.max)
    }
}

/// Always draws the same delay, clamped into the bounds.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub Duration);

impl DelaySampler for FixedSampler {
    fn sample(&self, bounds: &ThrottleBounds) -> Duration {
        if bounds.min >= bounds.max {
            return bounds.min;
        }
        let upper = bounds.max.saturating_sub(Duration::from_nanos(1));
        self.0.clamp(bounds.min, upper)
    }
}

/// What one call to [`Throttle::wait_then_mark`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleOutcome {
    /// Delay drawn for this request (not applied to the first request).
    pub delay: Duration,
    /// Time actually spent sleeping.
    pub waited: Duration,
}

/// Per-downloader request pacing.
///
/// `Throttle` is `Send + Sync`. Concurrent callers are serialized on one
/// timeline: the state lock is held across the wait.
#[derive(Debug)]
pub struct Throttle {
    bounds: ThrottleBounds,
    sampler: Arc<dyn DelaySampler>,

    /// Time of the last network request; `None` until the first one.
    last_request: Mutex<Option<Instant>>,

    /// Total time spent waiting, in milliseconds.
    total_waited_ms: AtomicU64,
}

impl Throttle {
    /// Creates a throttle drawing delays with [`UniformSampler`].
    #[must_use]
    pub fn new(bounds: ThrottleBounds) -> Self {
        Self::with_sampler(bounds, Arc::new(UniformSampler))
    }

    /// Creates a throttle with a custom delay source.
    #[must_use]
    #[instrument(skip(sampler), fields(min_ms = bounds.min.as_millis(), max_ms = bounds.max.as_millis()))]
    pub fn with_sampler(bounds: ThrottleBounds, sampler: Arc<dyn DelaySampler>) -> Self {
        debug!("creating throttle");
        Self {
            bounds,
            sampler,
            last_request: Mutex::new(None),
            total_waited_ms: AtomicU64::new(0),
        }
    }

    /// Returns the configured bounds.
    #[must_use]
    pub fn bounds(&self) -> ThrottleBounds {
        self.bounds
    }

    /// Time of the most recent network request, if any.
    pub async fn last_request_at(&self) -> Option<Instant> {
        *self.last_request.lock().await
    }

    /// Total time spent sleeping across all calls.
    #[must_use]
    pub fn total_waited(&self) -> Duration {
        Duration::from_millis(self.total_waited_ms.load(Ordering::SeqCst))
    }

    /// Waits until a freshly drawn delay has passed since the previous
    /// request, then records now as the latest request time.
    ///
    /// Call immediately before issuing a network request. The request counts
    /// as made even if it later fails. Dropping the returned future while it
    /// sleeps leaves the recorded time unchanged.
    #[instrument(skip(self))]
    pub async fn wait_then_mark(&self) -> ThrottleOutcome {
        let mut last_request_guard = self.last_request.lock().await;
        let delay = self.sampler.sample(&self.bounds);

        let waited = if let Some(last_request) = *last_request_guard {
            let target = last_request + delay;
            let remaining = target.saturating_duration_since(Instant::now());

            if remaining.is_zero() {
                debug!(
                    delay_ms = delay.as_millis(),
                    "throttle interval already elapsed"
                );
            } else {
                debug!(
                    delay_ms = delay.as_millis(),
                    wait_ms = remaining.as_millis(),
                    "waiting for throttle interval"
                );
                tokio::time::sleep_until(target).await;
                self.add_waited(remaining);
            }
            remaining
        } else {
            debug!("first network request - no delay");
            Duration::ZERO
        };

        *last_request_guard = Some(Instant::now());
        ThrottleOutcome { delay, waited }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_waited(&self, waited: Duration) {
        self.total_waited_ms
            .fetch_add(waited.as_millis() as u64, Ordering::SeqCst);
    }
}
