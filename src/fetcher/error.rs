//! Error types returned by [`Downloader`](super::Downloader).

use thiserror::Error;

use crate::ban::DetectorError;
use crate::cache::{CacheError, CodecError};
use crate::transport::{FetchError, FetchedResponse, TransportBuildError};

/// Errors from [`Downloader::open`](super::Downloader::open) and friends.
///
/// Nothing is retried internally; callers decide what to do with each case.
#[derive(Debug, Error)]
pub enum Error {
    /// The cache could not be read or written.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(#[source] CacheError),

    /// A cached payload could not be compressed or decompressed.
    #[error("cache codec failed: {0}")]
    Codec(#[source] CodecError),

    /// The network request failed or returned a non-success status.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The ban detector flagged the response. Nothing was cached.
    #[error(transparent)]
    Banned(Box<BannedError>),

    /// The ban detector itself failed. Nothing was cached.
    #[error("ban detector failed: {0}")]
    Detector(#[source] DetectorError),
}

impl From<CacheError> for Error {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::Codec(codec) => Self::Codec(codec),
            other => Self::CacheUnavailable(other),
        }
    }
}

impl From<BannedError> for Error {
    fn from(error: BannedError) -> Self {
        Self::Banned(Box::new(error))
    }
}

impl Error {
    /// Whether this is a ban.
    #[must_use]
    pub fn is_banned(&self) -> bool {
        matches!(self, Self::Banned(_))
    }

    /// HTTP status of a failed fetch, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Fetch(fetch) => fetch.status(),
            _ => None,
        }
    }
}

/// A response the ban detector rejected.
#[derive(Debug, Error)]
#[error("banned by server while fetching {}", .response.url)]
pub struct BannedError {
    /// The offending response, for inspection.
    pub response: FetchedResponse,
}

/// Errors from [`DownloaderBuilder::build`](super::DownloaderBuilder::build).
#[derive(Debug, Error)]
pub enum BuildError {
    /// The cache file could not be opened.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The HTTP transport could not be configured.
    #[error(transparent)]
    Transport(#[from] TransportBuildError),
}
