//! Entity cache.
//!
//! Whole entities are serialized into a [`CacheStore`] under
//! `"<table>:<id>"` keys. The [`CacheManager`] owns the key scheme and the
//! serialization; deciding *when* to read or write the cache is left to
//! the repository.
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 10000
//! ttl_seconds = 300
//! ```

mod config;
mod keys;
mod lock;
mod manager;
mod store;

use thiserror::Error;

pub use config::CacheConfig;
pub use keys::{EntityKey, matches_pattern, table_pattern};
pub use manager::CacheManager;
pub use store::{CacheStore, MemoryCacheStore};

pub const METRIC_CACHE_HIT: &str = "docvault_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "docvault_cache_miss_total";
pub const METRIC_CACHE_ERROR: &str = "docvault_cache_error_total";
pub const METRIC_CACHE_EVICT: &str = "docvault_cache_evict_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(String),
    #[error("failed to serialize cache entry `{key}`: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to deserialize cache entry `{key}`: {source}")]
    Deserialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{table}` entity has no id and cannot be cached")]
    MissingId { table: &'static str },
}

impl CacheError {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}
