//! Cache storage: the byte-level key/value seam and its in-process store.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;

use super::config::CacheConfig;
use super::keys::matches_pattern;
use super::lock::{rw_read, rw_write};
use super::{CacheError, METRIC_CACHE_EVICT};

const SOURCE: &str = "cache::store";

/// Key/value byte store with expiry and pattern listing.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Store `value` under `key`; `None` keeps it until evicted or deleted.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>)
    -> Result<(), CacheError>;

    /// Remove `key`; `true` if an entry was present.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Live keys matching `pattern` (trailing `*` for prefix match).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;
}

#[derive(Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// LRU-bounded in-process cache store.
///
/// Expired entries read as misses and are dropped when touched.
pub struct MemoryCacheStore {
    entries: RwLock<LruCache<String, Entry>>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_capacity(config.capacity_non_zero())
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &str) -> Option<Bytes> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let (live, value) = entries
            .get(key)
            .map(|entry| (entry.is_live(Instant::now()), entry.value.clone()))?;
        if live {
            Some(value)
        } else {
            entries.pop(key);
            None
        }
    }

    fn insert(&self, key: &str, value: Bytes, ttl: Option<Duration>) {
        let entry = Entry {
            value,
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        };
        let displaced = rw_write(&self.entries, SOURCE, "set").push(key.to_string(), entry);
        if let Some((evicted, _)) = displaced
            && evicted != key
        {
            counter!(METRIC_CACHE_EVICT).increment(1);
        }
    }

    fn remove(&self, key: &str) -> bool {
        rw_write(&self.entries, SOURCE, "delete").pop(key).is_some()
    }

    fn matching(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        rw_read(&self.entries, SOURCE, "keys")
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && matches_pattern(pattern, key))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        Ok(self.lookup(key))
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.insert(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.remove(key))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        Ok(self.matching(pattern))
    }
}
