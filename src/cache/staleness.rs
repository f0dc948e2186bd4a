//! Staleness policy for cached entries.

use std::time::{Duration, SystemTime};

use super::CacheEntry;

/// Outcome of checking the cache for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// An entry exists and is younger than `stale_after`.
    Fresh,
    /// An entry exists but must be re-fetched.
    Stale,
    /// No entry exists for the key.
    Absent,
}

impl Freshness {
    /// Whether the request has to go to the network.
    #[must_use]
    pub fn needs_network(self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

/// Returns `true` when an entry fetched at `fetched_at` is at least
/// `stale_after` old at `now`.
///
/// A `stale_after` of zero makes every entry stale. A `fetched_at` in the
/// future (wall clock stepped backwards) counts as age zero.
#[must_use]
pub fn is_stale(fetched_at: SystemTime, now: SystemTime, stale_after: Duration) -> bool {
    let age = now.duration_since(fetched_at).unwrap_or(Duration::ZERO);
    age >= stale_after
}

/// Classifies a cache lookup result.
#[must_use]
pub fn assess(entry: Option<&CacheEntry>, now: SystemTime, stale_after: Duration) -> Freshness {
    match entry {
        None => Freshness::Absent,
        Some(entry) if is_stale(entry.fetched_at, now, stale_after) => Freshness::Stale,
        Some(_) => Freshness::Fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheKey, ContentKind};

    const T0: Duration = Duration::from_secs(1_700_000_000);

    fn at(offset_secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + T0 + Duration::from_secs(offset_secs)
    }

    fn entry_fetched_at(fetched_at: SystemTime) -> CacheEntry {
        CacheEntry {
            key: CacheKey::from_stored("k".to_string()),
            url: "https://example.com/".to_string(),
            final_url: "https://example.com/".to_string(),
            payload: b"body".to_vec(),
            fetched_at,
            content_kind: ContentKind::Binary,
            content_type: None,
        }
    }

    #[test]
    fn test_is_stale_younger_than_threshold() {
        assert!(!is_stale(at(0), at(59), Duration::from_secs(60)));
    }

    #[test]
    fn test_is_stale_exactly_at_threshold() {
        assert!(is_stale(at(0), at(60), Duration::from_secs(60)));
    }

    #[test]
    fn test_is_stale_older_than_threshold() {
        assert!(is_stale(at(0), at(70), Duration::from_secs(60)));
    }

    #[test]
    fn test_is_stale_zero_threshold_always_stale() {
        assert!(is_stale(at(0), at(0), Duration::ZERO));
        assert!(is_stale(at(5), at(0), Duration::ZERO));
    }

    #[test]
    fn test_is_stale_future_fetch_time_counts_as_fresh() {
        assert!(!is_stale(at(100), at(0), Duration::from_secs(60)));
    }

    #[test]
    fn test_assess_absent() {
        let result = assess(None, at(0), Duration::from_secs(60));
        assert_eq!(result, Freshness::Absent);
        assert!(result.needs_network());
    }

    #[test]
    fn test_assess_fresh_and_stale() {
        let entry = entry_fetched_at(at(0));
        let fresh = assess(Some(&entry), at(10), Duration::from_secs(60));
        let stale = assess(Some(&entry), at(70), Duration::from_secs(60));
        assert_eq!(fresh, Freshness::Fresh);
        assert!(!fresh.needs_network());
        assert_eq!(stale, Freshness::Stale);
        assert!(stale.needs_network());
    }
}
