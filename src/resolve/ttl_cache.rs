//! Small time-to-live cache with an injectable clock.
//!
//! Used by the registry to absorb bursts of requests for the same input URI
//! without re-running resolver network calls.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to. Handy for deterministic expiry tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

struct Slot<V> {
    value: V,
    expires_at: u64,
}

/// Map whose entries expire a fixed duration after insertion.
///
/// Reading an expired entry behaves as a miss and evicts it. Every insert
/// also sweeps out whatever else has expired, so keys that are never read
/// again do not pile up.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Slot<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now_millis();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(slot) if now <= slot.expires_at => return Some(slot.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict, unless a concurrent writer refreshed it meanwhile.
        let mut entries = self.entries.write();
        if let Some(slot) = entries.get(key) {
            if now <= slot.expires_at {
                return Some(slot.value.clone());
            }
            entries.remove(key);
            tracing::trace!("TTL cache entry expired");
        }
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write();
        purge_expired(&mut entries, now);
        entries.insert(key, self.slot(value, now));
    }

    /// Insert unless a live entry exists. Returns whether `value` was stored.
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write();
        purge_expired(&mut entries, now);
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, self.slot(value, now));
        true
    }

    fn slot(&self, value: V, now: u64) -> Slot<V> {
        Slot {
            value,
            expires_at: now.saturating_add(self.ttl.as_millis() as u64),
        }
    }

    /// Return the live value for `key`, or compute, store and return a new
    /// one. The computation runs without holding any lock, so concurrent
    /// misses for the same key may both compute; the last insert wins.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = compute().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().remove(key).map(|slot| slot.value)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, expired ones included until the next read of
    /// that key or the next insert.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn purge_expired<K, V>(entries: &mut HashMap<K, Slot<V>>, now: u64) {
    let before = entries.len();
    entries.retain(|_, slot| now <= slot.expires_at);
    let purged = before - entries.len();
    if purged > 0 {
        tracing::trace!(purged, "Purged expired TTL cache entries");
    }
}
