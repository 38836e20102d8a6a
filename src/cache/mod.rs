//! Fetch cache: payload bytes plus HTTP validators, keyed by resolved URL.
//!
//! An entry is created on a 200 response, has its validators refreshed on a
//! 304 (payload untouched), and is replaced wholesale by the next 200.
//! Entries for different URLs never contend. Concurrent writers for the same
//! URL are not serialized; the last writer wins.

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mediafetch_common::Result;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::CacheConfig;

pub use disk::DiskCache;
pub use memory::MemoryCache;

/// Conditional request validators captured from a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validators {
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Validators {
    /// Merge validators from a 304 response. Fields the response omits keep
    /// their previous value.
    pub fn refreshed(&self, fresh: Validators) -> Validators {
        Validators {
            etag: fresh.etag.or_else(|| self.etag.clone()),
            last_modified: fresh.last_modified.or(self.last_modified),
            expires_at: fresh.expires_at.or(self.expires_at),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none() && self.expires_at.is_none()
    }
}

/// Metadata for one cached payload. The bytes are read separately through
/// [`FetchCache::payload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub uri: Url,
    pub validators: Validators,
    /// When the payload was written.
    pub stored_at: DateTime<Utc>,
    /// When the entry was last confirmed by the origin (200 or 304).
    pub refreshed_at: DateTime<Utc>,
    /// Payload length in bytes.
    pub len: u64,
}

impl CacheEntry {
    pub fn new(uri: Url, validators: Validators, len: u64) -> Self {
        let now = Utc::now();
        Self {
            uri,
            validators,
            stored_at: now,
            refreshed_at: now,
            len,
        }
    }

    /// Apply validators from a 304 and bump `refreshed_at`.
    pub fn refresh(&mut self, fresh: Validators) {
        self.validators = self.validators.refreshed(fresh);
        self.refreshed_at = Utc::now();
    }

    pub fn is_expired(&self) -> bool {
        self.validators.is_expired_at(Utc::now())
    }
}

/// Storage backend for fetched payloads.
#[async_trait]
pub trait FetchCache: Send + Sync {
    /// Look up entry metadata, expired or not.
    async fn entry(&self, uri: &Url) -> Result<Option<CacheEntry>>;

    /// Read the cached payload bytes.
    async fn payload(&self, uri: &Url) -> Result<Option<Bytes>>;

    /// Write a fresh entry, replacing any previous one.
    async fn store(&self, uri: &Url, validators: Validators, payload: Bytes) -> Result<CacheEntry>;

    /// Refresh validators after a 304. Returns `None` when no entry exists.
    async fn refresh(&self, uri: &Url, validators: Validators) -> Result<Option<CacheEntry>>;

    /// Drop an entry. Returns `true` when one existed.
    async fn remove(&self, uri: &Url) -> Result<bool>;
}

/// Build the configured backend: on disk when `dir` is set, in memory
/// otherwise.
pub fn from_config(config: &CacheConfig) -> Result<Arc<dyn FetchCache>> {
    match &config.dir {
        Some(dir) => {
            let dir = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
            Ok(Arc::new(DiskCache::open(dir)?))
        }
        None => Ok(Arc::new(MemoryCache::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn refresh_keeps_missing_fields() {
        let previous = Validators {
            etag: Some("abc".into()),
            last_modified: Some(Utc::now() - Duration::days(1)),
            expires_at: None,
        };
        let expires = Utc::now() + Duration::minutes(5);
        let merged = previous.refreshed(Validators {
            etag: None,
            last_modified: None,
            expires_at: Some(expires),
        });

        assert_eq!(merged.etag.as_deref(), Some("abc"));
        assert_eq!(merged.last_modified, previous.last_modified);
        assert_eq!(merged.expires_at, Some(expires));
    }

    #[test]
    fn refresh_prefers_new_etag() {
        let previous = Validators {
            etag: Some("old".into()),
            ..Default::default()
        };
        let merged = previous.refreshed(Validators {
            etag: Some("new".into()),
            ..Default::default()
        });
        assert_eq!(merged.etag.as_deref(), Some("new"));
    }

    #[test]
    fn expiry() {
        let now = Utc::now();
        let validators = Validators {
            expires_at: Some(now - Duration::seconds(1)),
            ..Default::default()
        };
        assert!(validators.is_expired_at(now));
        assert!(!Validators::default().is_expired_at(now));
        assert!(Validators::default().is_empty());
    }

    #[test]
    fn memory_backend_without_dir() {
        assert!(from_config(&CacheConfig::default()).is_ok());
    }
}
