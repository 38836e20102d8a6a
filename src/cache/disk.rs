//! On-disk fetch cache.
//!
//! Each entry is stored as two files named after the SHA-256 of the URL:
//! `{hash}.json` holds the [`CacheEntry`] metadata and `{hash}.bin` holds
//! the payload. Both are written to a temporary file first and renamed into
//! place, so a reader sees either the old or the new file, never a torn one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use mediafetch_common::{Error, Result};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use super::{CacheEntry, FetchCache, Validators};

pub struct DiskCache {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl DiskCache {
    /// Open (and create if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.bin"))
    }

    async fn write_atomic(&self, target: &Path, data: &[u8]) -> Result<()> {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = target.with_extension(format!("tmp.{}.{n}", std::process::id()));
        tokio::fs::write(&tmp, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_meta(&self, key: &str) -> Result<Option<CacheEntry>> {
        let Some(raw) = read_optional(&self.meta_path(key)).await? else {
            return Ok(None);
        };
        let entry = serde_json::from_slice(&raw)
            .map_err(|e| Error::serialization(format!("cache entry {key}: {e}")))?;
        Ok(Some(entry))
    }

    async fn write_meta(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let raw = serde_json::to_vec_pretty(entry)
            .map_err(|e| Error::serialization(format!("cache entry {key}: {e}")))?;
        self.write_atomic(&self.meta_path(key), &raw).await
    }
}

#[async_trait]
impl FetchCache for DiskCache {
    async fn entry(&self, uri: &Url) -> Result<Option<CacheEntry>> {
        self.read_meta(&cache_key(uri)).await
    }

    async fn payload(&self, uri: &Url) -> Result<Option<Bytes>> {
        let key = cache_key(uri);
        Ok(read_optional(&self.payload_path(&key)).await?.map(Bytes::from))
    }

    async fn store(&self, uri: &Url, validators: Validators, payload: Bytes) -> Result<CacheEntry> {
        let key = cache_key(uri);
        let entry = CacheEntry::new(uri.clone(), validators, payload.len() as u64);

        // Payload first so metadata never points at missing bytes.
        self.write_atomic(&self.payload_path(&key), &payload).await?;
        self.write_meta(&key, &entry).await?;

        debug!(uri = %uri, key = %key, bytes = entry.len, "Stored cache entry");
        Ok(entry)
    }

    async fn refresh(&self, uri: &Url, validators: Validators) -> Result<Option<CacheEntry>> {
        let key = cache_key(uri);
        let Some(mut entry) = self.read_meta(&key).await? else {
            return Ok(None);
        };
        entry.refresh(validators);
        self.write_meta(&key, &entry).await?;
        Ok(Some(entry))
    }

    async fn remove(&self, uri: &Url) -> Result<bool> {
        let key = cache_key(uri);
        let meta = remove_optional(&self.meta_path(&key)).await?;
        let payload = remove_optional(&self.payload_path(&key)).await?;
        Ok(meta || payload)
    }
}

/// Hex SHA-256 of the URL string.
fn cache_key(uri: &Url) -> String {
    hex::encode(Sha256::digest(uri.as_str().as_bytes()))
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_optional(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DiskCache) {
        let tmp = TempDir::new().unwrap();
        let cache = DiskCache::open(tmp.path().join("cache")).unwrap();
        (tmp, cache)
    }

    #[test]
    fn keys_are_stable_hex() {
        let uri = Url::parse("https://example.com/cat.png").unwrap();
        let key = cache_key(&uri);
        assert_eq!(key.len(), 64);
        assert_eq!(key, cache_key(&uri));
        assert_ne!(
            key,
            cache_key(&Url::parse("https://example.com/dog.png").unwrap())
        );
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let (tmp, cache) = setup();
        let uri = Url::parse("https://example.com/cat.png").unwrap();
        let validators = Validators {
            etag: Some("abc".into()),
            ..Default::default()
        };
        cache
            .store(&uri, validators.clone(), Bytes::from_static(b"bytes"))
            .await
            .unwrap();

        let reopened = DiskCache::open(tmp.path().join("cache")).unwrap();
        let entry = reopened.entry(&uri).await.unwrap().unwrap();
        assert_eq!(entry.uri, uri);
        assert_eq!(entry.validators, validators);
        assert_eq!(entry.len, 5);
        assert_eq!(
            reopened.payload(&uri).await.unwrap(),
            Some(Bytes::from_static(b"bytes"))
        );
    }

    #[tokio::test]
    async fn refresh_rewrites_metadata_only() {
        let (_tmp, cache) = setup();
        let uri = Url::parse("https://example.com/cat.png").unwrap();
        cache
            .store(&uri, Validators::default(), Bytes::from_static(b"v1"))
            .await
            .unwrap();

        let entry = cache
            .refresh(
                &uri,
                Validators {
                    etag: Some("xyz".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.validators.etag.as_deref(), Some("xyz"));
        assert_eq!(
            cache.payload(&uri).await.unwrap(),
            Some(Bytes::from_static(b"v1"))
        );
    }

    #[tokio::test]
    async fn missing_and_removed_entries() {
        let (_tmp, cache) = setup();
        let uri = Url::parse("https://example.com/gone.png").unwrap();

        assert!(cache.entry(&uri).await.unwrap().is_none());
        assert!(cache.payload(&uri).await.unwrap().is_none());

        cache
            .store(&uri, Validators::default(), Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(cache.remove(&uri).await.unwrap());
        assert!(!cache.remove(&uri).await.unwrap());
        assert!(cache.entry(&uri).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_metadata_is_a_serialization_error() {
        let (_tmp, cache) = setup();
        let uri = Url::parse("https://example.com/bad.png").unwrap();
        std::fs::write(cache.meta_path(&cache_key(&uri)), b"{not json").unwrap();

        let err = cache.entry(&uri).await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
