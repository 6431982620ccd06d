//! Serialization of whole entities into the cache store.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use tracing::trace;

use crate::domain::schema::Entity;

use super::config::CacheConfig;
use super::keys::{EntityKey, table_pattern};
use super::store::{CacheStore, MemoryCacheStore};
use super::{CacheError, METRIC_CACHE_HIT, METRIC_CACHE_MISS};

/// Cache-aside storage of entities keyed by `"<table>:<id>"`.
///
/// Cheap to clone; clones share the underlying store.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    ttl: Option<Duration>,
    enabled: bool,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            ttl: config.ttl(),
            enabled: config.enabled,
        }
    }

    /// Manager over a fresh [`MemoryCacheStore`] sized by `config`.
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(Arc::new(MemoryCacheStore::new(config)), config)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub async fn set<E: Entity>(&self, entity: &E) -> Result<(), CacheError> {
        let id = entity
            .id()
            .ok_or(CacheError::MissingId { table: E::TABLE })?;
        let key = EntityKey::new(E::TABLE, id).to_string();
        let payload = serde_json::to_vec(entity).map_err(|source| CacheError::Serialize {
            key: key.clone(),
            source,
        })?;
        self.store.set(&key, Bytes::from(payload), self.ttl).await?;
        trace!(table = E::TABLE, id, "cache entry stored");
        Ok(())
    }

    /// Cached entity for `id`; a miss is `Ok(None)`.
    pub async fn get<E: Entity>(&self, id: i64) -> Result<Option<E>, CacheError> {
        let key = EntityKey::new(E::TABLE, id).to_string();
        let Some(payload) = self.store.get(&key).await? else {
            counter!(METRIC_CACHE_MISS, "table" => E::TABLE).increment(1);
            return Ok(None);
        };
        counter!(METRIC_CACHE_HIT, "table" => E::TABLE).increment(1);
        serde_json::from_slice(&payload)
            .map(Some)
            .map_err(|source| CacheError::Deserialize { key, source })
    }

    /// Remove the entry for `entity`; a never-inserted entity is a no-op.
    pub async fn delete<E: Entity>(&self, entity: &E) -> Result<bool, CacheError> {
        match entity.id() {
            Some(id) => self.delete_id::<E>(id).await,
            None => Ok(false),
        }
    }

    pub async fn delete_id<E: Entity>(&self, id: i64) -> Result<bool, CacheError> {
        let key = EntityKey::new(E::TABLE, id).to_string();
        let removed = self.store.delete(&key).await?;
        trace!(table = E::TABLE, id, removed, "cache entry invalidated");
        Ok(removed)
    }

    /// Drop every cached entity of type `E`.
    ///
    /// Listing and deleting are separate store calls, so an entry written
    /// in between may survive.
    pub async fn delete_all<E: Entity>(&self) -> Result<usize, CacheError> {
        let keys = self.store.keys(&table_pattern(E::TABLE)).await?;
        let mut removed = 0;
        for key in keys {
            if self.store.delete(&key).await? {
                removed += 1;
            }
        }
        trace!(table = E::TABLE, removed, "cache entries flushed");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Comment, Document};

    fn manager() -> CacheManager {
        CacheManager::in_memory(&CacheConfig::default())
    }

    fn document(id: i64) -> Document {
        let mut document = Document::new(1, 1, format!("doc-{id}"));
        document.id = Some(id);
        document
    }

    #[tokio::test]
    async fn set_then_get_round_trips_entity() {
        let cache = manager();
        let stored = document(5);
        cache.set(&stored).await.expect("set");

        let loaded = cache.get::<Document>(5).await.expect("get");
        assert_eq!(loaded, Some(stored));
        assert_eq!(cache.get::<Document>(6).await.expect("get"), None);
    }

    #[tokio::test]
    async fn entity_without_id_is_rejected() {
        let cache = manager();
        let err = cache
            .set(&Document::new(1, 1, "draft"))
            .await
            .expect_err("missing id");
        assert!(matches!(err, CacheError::MissingId { table: "documents" }));
    }

    #[tokio::test]
    async fn delete_all_only_touches_one_table() {
        let cache = manager();
        cache.set(&document(1)).await.expect("set");
        cache.set(&document(2)).await.expect("set");
        let mut comment = Comment::new(1, 1, "hi");
        comment.id = Some(1);
        cache.set(&comment).await.expect("set");

        assert_eq!(cache.delete_all::<Document>().await.expect("flush"), 2);
        assert_eq!(cache.get::<Document>(1).await.expect("get"), None);
        assert!(cache.get::<Comment>(1).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn corrupt_entry_surfaces_deserialize_error() {
        let cache = manager();
        cache
            .store()
            .set("documents:9", Bytes::from_static(b"not json"), None)
            .await
            .expect("raw set");
        let err = cache.get::<Document>(9).await.expect_err("corrupt entry");
        assert!(matches!(err, CacheError::Deserialize { .. }));
    }
}
