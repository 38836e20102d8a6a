use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use mediafetch_common::Result;
use url::Url;

use super::{CacheEntry, FetchCache, Validators};

/// In-process cache. Sharded by URL so unrelated fetches never contend.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<Url, (CacheEntry, Bytes)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl FetchCache for MemoryCache {
    async fn entry(&self, uri: &Url) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(uri).map(|slot| slot.0.clone()))
    }

    async fn payload(&self, uri: &Url) -> Result<Option<Bytes>> {
        Ok(self.entries.get(uri).map(|slot| slot.1.clone()))
    }

    async fn store(&self, uri: &Url, validators: Validators, payload: Bytes) -> Result<CacheEntry> {
        let entry = CacheEntry::new(uri.clone(), validators, payload.len() as u64);
        self.entries.insert(uri.clone(), (entry.clone(), payload));
        Ok(entry)
    }

    async fn refresh(&self, uri: &Url, validators: Validators) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get_mut(uri).map(|mut slot| {
            slot.0.refresh(validators);
            slot.0.clone()
        }))
    }

    async fn remove(&self, uri: &Url) -> Result<bool> {
        Ok(self.entries.remove(uri).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn store_then_read() {
        let cache = MemoryCache::new();
        let uri = url("https://example.com/cat.png");

        assert!(cache.entry(&uri).await.unwrap().is_none());

        let entry = cache
            .store(&uri, Validators::default(), Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert_eq!(entry.len, 3);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.payload(&uri).await.unwrap(),
            Some(Bytes::from_static(b"png"))
        );
    }

    #[tokio::test]
    async fn refresh_leaves_payload_alone() {
        let cache = MemoryCache::new();
        let uri = url("https://example.com/cat.png");
        let validators = Validators {
            etag: Some("abc".into()),
            ..Default::default()
        };
        cache
            .store(&uri, validators, Bytes::from_static(b"original"))
            .await
            .unwrap();

        let refreshed = cache
            .refresh(
                &uri,
                Validators {
                    etag: Some("def".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(refreshed.validators.etag.as_deref(), Some("def"));
        assert_eq!(
            cache.payload(&uri).await.unwrap(),
            Some(Bytes::from_static(b"original"))
        );
    }

    #[tokio::test]
    async fn refresh_missing_entry() {
        let cache = MemoryCache::new();
        let uri = url("https://example.com/none.png");
        assert!(cache
            .refresh(&uri, Validators::default())
            .await
            .unwrap()
            .is_none());
        assert!(!cache.remove(&uri).await.unwrap());
    }
}
