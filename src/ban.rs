//! Ban detection hook.
//!
//! Some servers answer a client they have flagged as a robot with `200 OK`
//! and a body announcing the ban, identical for every URL. Without a check the
//! downloader would cache that page under every key. A [`BanDetector`] sees
//! each network response before it is cached; returning `true` fails the
//! request instead.
//!
//! Any `Fn(&FetchedResponse) -> bool` is a detector:
//!
//! ```
//! use fetcher_core::ban::BanDetector;
//! use fetcher_core::transport::FetchedResponse;
//!
//! let detector = |response: &FetchedResponse| response.body_text().contains("Access denied");
//! # let response = FetchedResponse {
//! #     url: "https://example.com/".into(),
//! #     final_url: "https://example.com/".into(),
//! #     status: 200,
//! #     headers: vec![],
//! #     body: b"Access denied".to_vec(),
//! # };
//! assert!(detector.is_banned(&response).unwrap());
//! ```

use crate::transport::FetchedResponse;

/// Error raised by a detector that could not reach a verdict.
pub type DetectorError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Decides whether a response shows that the server banned the client.
pub trait BanDetector: Send + Sync {
    /// Inspects `response`.
    ///
    /// # Errors
    ///
    /// Detector failures are passed to the caller unchanged.
    fn is_banned(&self, response: &FetchedResponse) -> Result<bool, DetectorError>;
}

impl<F> BanDetector for F
where
    F: Fn(&FetchedResponse) -> bool + Send + Sync,
{
    fn is_banned(&self, response: &FetchedResponse) -> Result<bool, DetectorError> {
        Ok(self(response))
    }
}

/// Flags responses whose body contains a marker.
#[derive(Debug, Clone)]
pub struct BodyContains {
    marker: Vec<u8>,
}

impl BodyContains {
    /// Creates a detector for `marker`. An empty marker never matches.
    #[must_use]
    pub fn new(marker: impl Into<Vec<u8>>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl BanDetector for BodyContains {
    fn is_banned(&self, response: &FetchedResponse) -> Result<bool, DetectorError> {
        if self.marker.is_empty() {
            return Ok(false);
        }
        Ok(response
            .body
            .windows(self.marker.len())
            .any(|window| window == self.marker.as_slice()))
    }
}
