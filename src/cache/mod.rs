//! Disk-backed response cache.
//!
//! Entries live in a single SQLite table keyed by [`CacheKey`]. Payloads pass
//! through a [`Codec`] on their way in and out, so the store hands out plain
//! bytes while keeping them compressed at rest.
//!
//! # Overview
//!
//! - [`CacheStore`] - get/put/remove against the backing database
//! - [`CacheEntry`] - one stored response with its fetch metadata
//! - [`CacheKey`] - stable request identity
//! - [`staleness`] - fresh/stale/absent classification
//!
//! Writes are a single upsert statement, so a concurrent reader (in this or
//! another process) sees either the previous entry or the new one in full.

pub mod codec;
mod key;
pub mod staleness;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sqlx::Row;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::db::{Database, DbError};

pub use codec::{Codec, CodecError, Uncompressed, ZlibCodec};
pub use key::CacheKey;
pub use staleness::{Freshness, assess, is_stale};

/// Errors from cache storage operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache database could not be opened or migrated.
    #[error("failed to open cache: {0}")]
    Open(#[from] DbError),

    /// A read or write against the backing store failed.
    #[error("cache storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// A stored row could not be interpreted.
    #[error("corrupt cache record {key}: {reason}")]
    Corrupt {
        /// Key of the offending row.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The payload codec failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl CacheError {
    fn corrupt(key: &CacheKey, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// How a cached resource should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Opaque bytes.
    Binary,
    /// An HTML document.
    Html,
}

impl ContentKind {
    /// Stable label stored in the database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Html => "html",
        }
    }

    /// Parses a stored label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "binary" => Some(Self::Binary),
            "html" => Some(Self::Html),
            _ => None,
        }
    }

    /// Classifies a `Content-Type` header value.
    ///
    /// `text/html` and `application/xhtml+xml` are HTML; everything else,
    /// including a missing header, is binary.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let essence = content_type
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase());
        match essence.as_deref() {
            Some("text/html" | "application/xhtml+xml") => Self::Html,
            _ => Self::Binary,
        }
    }
}

/// One cached response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Request identity.
    pub key: CacheKey,
    /// URL that was requested.
    pub url: String,
    /// URL the response was served from after redirects.
    pub final_url: String,
    /// Response body, uncompressed.
    pub payload: Vec<u8>,
    /// Wall-clock time the response was received (millisecond precision at rest).
    pub fetched_at: SystemTime,
    /// HTML or binary.
    pub content_kind: ContentKind,
    /// `Content-Type` header of the response, if any.
    pub content_type: Option<String>,
}

/// Persistent key → entry mapping.
#[derive(Debug, Clone)]
pub struct CacheStore {
    db: Database,
    codec: Arc<dyn Codec>,
}

impl CacheStore {
    /// Opens (or creates) a cache file using the default zlib codec.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Open`] if the database cannot be opened or migrated.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, CacheError> {
        let db = Database::open(path).await?;
        Ok(Self::new(db))
    }

    /// Creates a throwaway in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Open`] if the database cannot be created.
    pub async fn open_in_memory() -> Result<Self, CacheError> {
        let db = Database::in_memory().await?;
        Ok(Self::new(db))
    }

    /// Wraps an open database with the default zlib codec.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self::with_codec(db, Arc::new(ZlibCodec::default()))
    }

    /// Wraps an open database with a custom codec.
    #[must_use]
    pub fn with_codec(db: Database, codec: Arc<dyn Codec>) -> Self {
        Self { db, codec }
    }

    /// Returns the underlying database.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Closes every pooled connection. Later operations fail with
    /// [`CacheError::Unavailable`].
    pub async fn close(&self) {
        self.db.pool().close().await;
    }

    /// Looks up the entry for `key`.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Unavailable`] on storage faults
    /// - [`CacheError::Corrupt`] if the stored row is malformed
    /// - [`CacheError::Codec`] if the payload cannot be decompressed
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query(
            r"SELECT url, final_url, content_kind, content_type, fetched_at_ms, payload
              FROM cache_entries
              WHERE cache_key = ?",
        )
        .bind(key.as_str())
        .fetch_optional(self.db.pool())
        .await?;

        let Some(row) = row else {
            debug!("cache miss");
            return Ok(None);
        };

        let kind_label: String = row.try_get("content_kind")?;
        let content_kind = ContentKind::parse(&kind_label)
            .ok_or_else(|| CacheError::corrupt(key, format!("unknown content kind {kind_label:?}")))?;
        let fetched_at_ms: i64 = row.try_get("fetched_at_ms")?;
        let fetched_at = system_time_from_millis(fetched_at_ms)
            .ok_or_else(|| CacheError::corrupt(key, format!("invalid timestamp {fetched_at_ms}")))?;
        let stored: Vec<u8> = row.try_get("payload")?;
        let payload = self.codec.decompress(&stored)?;

        debug!(bytes = payload.len(), kind = content_kind.as_str(), "cache hit");
        Ok(Some(CacheEntry {
            key: key.clone(),
            url: row.try_get("url")?,
            final_url: row.try_get("final_url")?,
            payload,
            fetched_at,
            content_kind,
            content_type: row.try_get("content_type")?,
        }))
    }

    /// Stores `entry`, replacing any previous entry with the same key.
    ///
    /// # Errors
    ///
    /// - [`CacheError::Codec`] if compression fails (nothing is written)
    /// - [`CacheError::Unavailable`] on storage faults
    #[instrument(skip(self, entry), fields(key = %entry.key, url = %entry.url))]
    pub async fn put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let stored = self.codec.compress(&entry.payload)?;

        sqlx::query(
            r"INSERT INTO cache_entries (
                cache_key, url, final_url, content_kind, content_type, fetched_at_ms, payload
              )
              VALUES (?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(cache_key) DO UPDATE SET
                url = excluded.url,
                final_url = excluded.final_url,
                content_kind = excluded.content_kind,
                content_type = excluded.content_type,
                fetched_at_ms = excluded.fetched_at_ms,
                payload = excluded.payload",
        )
        .bind(entry.key.as_str())
        .bind(&entry.url)
        .bind(&entry.final_url)
        .bind(entry.content_kind.as_str())
        .bind(entry.content_type.as_deref())
        .bind(millis_since_epoch(entry.fetched_at))
        .bind(&stored)
        .execute(self.db.pool())
        .await?;

        debug!(
            bytes = entry.payload.len(),
            stored_bytes = stored.len(),
            "stored cache entry"
        );
        Ok(())
    }

    /// Deletes the entry for `key`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] on storage faults.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE cache_key = ?")
            .bind(key.as_str())
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] on storage faults.
    pub async fn len(&self) -> Result<u64, CacheError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cache_entries")
            .fetch_one(self.db.pool())
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Whether the cache holds no entries.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] on storage faults.
    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }

    /// Iterates over all stored keys.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] on storage faults.
    pub async fn keys(&self) -> Result<Vec<CacheKey>, CacheError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT cache_key FROM cache_entries ORDER BY cache_key")
                .fetch_all(self.db.pool())
                .await?;
        Ok(rows
            .into_iter()
            .map(|(raw,)| CacheKey::from_stored(raw))
            .collect())
    }
}

fn millis_since_epoch(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Drops sub-millisecond precision, matching what the cache stores.
#[must_use]
pub fn truncate_to_millis(time: SystemTime) -> SystemTime {
    system_time_from_millis(millis_since_epoch(time)).unwrap_or(UNIX_EPOCH)
}

fn system_time_from_millis(millis: i64) -> Option<SystemTime> {
    let millis = u64::try_from(millis).ok()?;
    UNIX_EPOCH.checked_add(Duration::from_millis(millis))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(url: &str, body: &[u8], fetched_at_secs: u64) -> CacheEntry {
        CacheEntry {
            key: CacheKey::derive(url, &[]).unwrap(),
            url: url.to_string(),
            final_url: url.to_string(),
            payload: body.to_vec(),
            fetched_at: UNIX_EPOCH + Duration::from_secs(fetched_at_secs),
            content_kind: ContentKind::Html,
            content_type: Some("text/html; charset=utf-8".to_string()),
        }
    }

    #[tokio::test]
    async fn test_cache_get_missing_returns_none() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let key = CacheKey::derive("https://example.com/missing", &[]).unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_put_then_get_round_trips() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let stored = entry("https://example.com/a", b"<p>hello</p>", 1_700_000_000);

        store.put(&stored).await.unwrap();
        let loaded = store.get(&stored.key).await.unwrap().unwrap();

        assert_eq!(loaded, stored);
    }

    #[tokio::test]
    async fn test_cache_put_overwrites_existing_entry() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let first = entry("https://example.com/a", b"old", 100);
        let mut second = entry("https://example.com/a", b"new", 200);
        second.content_kind = ContentKind::Binary;
        second.content_type = None;

        store.put(&first).await.unwrap();
        store.put(&second).await.unwrap();

        let loaded = store.get(&first.key).await.unwrap().unwrap();
        assert_eq!(loaded, second);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cache_payload_compressed_at_rest() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let body = b"<tr><td>row</td></tr>".repeat(200);
        let stored = entry("https://example.com/table", &body, 1);
        store.put(&stored).await.unwrap();

        let (raw,): (Vec<u8>,) =
            sqlx::query_as("SELECT payload FROM cache_entries WHERE cache_key = ?")
                .bind(stored.key.as_str())
                .fetch_one(store.database().pool())
                .await
                .unwrap();

        assert!(raw.len() < body.len());
        assert_eq!(ZlibCodec::default().decompress(&raw).unwrap(), body);
    }

    #[tokio::test]
    async fn test_cache_empty_payload_round_trips() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let stored = entry("https://example.com/empty", b"", 5);
        store.put(&stored).await.unwrap();
        let loaded = store.get(&stored.key).await.unwrap().unwrap();
        assert!(loaded.payload.is_empty());
    }

    #[tokio::test]
    async fn test_cache_remove_reports_presence() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let stored = entry("https://example.com/a", b"x", 1);
        store.put(&stored).await.unwrap();

        assert!(store.remove(&stored.key).await.unwrap());
        assert!(!store.remove(&stored.key).await.unwrap());
        assert!(store.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_keys_lists_entries() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let a = entry("https://example.com/a", b"a", 1);
        let b = entry("https://example.com/b", b"b", 1);
        store.put(&a).await.unwrap();
        store.put(&b).await.unwrap();

        let keys = store.keys().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&a.key));
        assert!(keys.contains(&b.key));
    }

    #[tokio::test]
    async fn test_cache_garbage_payload_surfaces_codec_error() {
        let store = CacheStore::open_in_memory().await.unwrap();
        let key = CacheKey::derive("https://example.com/broken", &[]).unwrap();
        sqlx::query(
            "INSERT INTO cache_entries (cache_key, url, final_url, content_kind, fetched_at_ms, payload)
             VALUES (?, 'https://example.com/broken', 'https://example.com/broken', 'binary', 0, x'DEADBEEF')",
        )
        .bind(key.as_str())
        .execute(store.database().pool())
        .await
        .unwrap();

        let err = store.get(&key).await.unwrap_err();
        assert!(matches!(err, CacheError::Codec(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_cache_closed_pool_is_unavailable() {
        let store = CacheStore::open_in_memory().await.unwrap();
        store.close().await;

        let key = CacheKey::derive("https://example.com/", &[]).unwrap();
        let err = store.get(&key).await.unwrap_err();
        assert!(matches!(err, CacheError::Unavailable(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_cache_persists_across_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("cache.sqlite");
        let stored = entry("https://example.com/persist", b"kept", 1_700_000_123);

        {
            let store = CacheStore::open(&path).await.unwrap();
            store.put(&stored).await.unwrap();
            store.close().await;
        }

        let reopened = CacheStore::open(&path).await.unwrap();
        let loaded = reopened.get(&stored.key).await.unwrap().unwrap();
        assert_eq!(loaded, stored);
    }

    #[tokio::test]
    async fn test_cache_concurrent_writers_never_mix_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("shared.sqlite");
        let first = CacheStore::open(&path).await.unwrap();
        let second = CacheStore::open(&path).await.unwrap();

        let url = "https://example.com/contended";
        let a = entry(url, &b"a".repeat(4096), 1);
        let b = entry(url, &b"b".repeat(8192), 2);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let (store_a, entry_a) = (first.clone(), a.clone());
            let (store_b, entry_b) = (second.clone(), b.clone());
            handles.push(tokio::spawn(async move { store_a.put(&entry_a).await }));
            handles.push(tokio::spawn(async move { store_b.put(&entry_b).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let loaded = first.get(&a.key).await.unwrap().unwrap();
        assert!(loaded == a || loaded == b, "entry must be one writer's in full");
    }

    #[test]
    fn test_content_kind_from_content_type() {
        assert_eq!(
            ContentKind::from_content_type(Some("text/html; charset=UTF-8")),
            ContentKind::Html
        );
        assert_eq!(
            ContentKind::from_content_type(Some("Application/XHTML+XML")),
            ContentKind::Html
        );
        assert_eq!(
            ContentKind::from_content_type(Some("application/pdf")),
            ContentKind::Binary
        );
        assert_eq!(ContentKind::from_content_type(None), ContentKind::Binary);
    }

    #[test]
    fn test_content_kind_labels_round_trip() {
        for kind in [ContentKind::Binary, ContentKind::Html] {
            assert_eq!(ContentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ContentKind::parse("video"), None);
    }

    #[test]
    fn test_millis_conversion_truncates_sub_millisecond() {
        let time = UNIX_EPOCH + Duration::from_micros(1_500_250);
        let back = system_time_from_millis(millis_since_epoch(time)).unwrap();
        assert_eq!(back, UNIX_EPOCH + Duration::from_millis(1_500));
        assert!(system_time_from_millis(-1).is_none());
    }
}
