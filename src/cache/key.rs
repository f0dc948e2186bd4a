//! Cache key derivation.
//!
//! A key is the SHA-256 of a canonical request description: the URL without
//! its fragment plus every request parameter that changes the response. The
//! digest is stable across runs, so a cache file keeps serving hits after a
//! restart.

use std::fmt;

use sha2::{Digest, Sha256};
use url::Url;

/// Format tag mixed into every digest. Bump when the canonical form changes.
const KEY_VERSION: &str = "v1";

/// Identity of a cached resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for `url` with request-affecting `params`.
    ///
    /// Parameter names are compared case-insensitively and their order does
    /// not matter.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `url` is not an absolute URL.
    pub fn derive(url: &str, params: &[(String, String)]) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url)?;
        Ok(Self::from_url(&parsed, params))
    }

    /// Derives the key from an already parsed URL.
    #[must_use]
    pub fn from_url(url: &Url, params: &[(String, String)]) -> Self {
        let mut canonical = url.clone();
        canonical.set_fragment(None);

        let mut normalized: Vec<(String, &str)> = params
            .iter()
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim()))
            .collect();
        normalized.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(KEY_VERSION.as_bytes());
        hasher.update(b"\n");
        hasher.update(canonical.as_str().as_bytes());
        hasher.update(b"\n");
        for (name, value) in normalized {
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }

        Self(format!("{:x}", hasher.finalize()))
    }

    /// Rebuilds a key read back from storage.
    pub(crate) fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
