//! Cache-aside facade over the entity manager.
//!
//! Only entity types flagged [`Entity::CACHEABLE`] touch the cache, and
//! only while the cache is enabled. Every cache effect runs after its
//! durable counterpart succeeded. Reads and populations degrade to the
//! durable store when the cache fails; invalidations do not, since a
//! swallowed invalidation could leave a stale entry behind.

use std::marker::PhantomData;

use metrics::counter;
use tracing::warn;

use crate::application::entity_manager::{Commit, EntityManager};
use crate::application::filter::{Query, Subquery};
use crate::application::repos::RepoError;
use crate::cache::{CacheError, CacheManager, METRIC_CACHE_ERROR};
use crate::domain::schema::{Column, Entity};

pub struct Repository<'a, E> {
    entity_manager: &'a mut EntityManager,
    cache: &'a CacheManager,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E: Entity> Repository<'a, E> {
    pub fn new(entity_manager: &'a mut EntityManager, cache: &'a CacheManager) -> Self {
        Self {
            entity_manager,
            cache,
            _entity: PhantomData,
        }
    }

    fn caching(&self) -> bool {
        E::CACHEABLE && self.cache.is_enabled()
    }

    fn degraded(op: &'static str, err: &CacheError) {
        warn!(
            table = E::TABLE,
            op,
            error = %err,
            "cache operation failed; continuing with durable store"
        );
        counter!(METRIC_CACHE_ERROR, "table" => E::TABLE, "op" => op).increment(1);
    }

    /// Store committed state. Skipped while the unit of work holds
    /// uncommitted writes, because what it reads may still roll back.
    async fn populate(&self, entity: &E) {
        if !self.caching() || self.entity_manager.has_pending_writes() {
            return;
        }
        if let Err(err) = self.cache.set(entity).await {
            Self::degraded("set", &err);
        }
    }

    /// Drop the cached entry of `entity`, if caching applies to `E`.
    pub async fn invalidate(&self, entity: &E) -> Result<(), RepoError> {
        if self.caching() {
            self.cache.delete(entity).await?;
        }
        Ok(())
    }

    /// Drop every cached entry of `E`, if caching applies to `E`.
    pub async fn invalidate_all(&self) -> Result<(), RepoError> {
        if self.caching() {
            self.cache.delete_all::<E>().await?;
        }
        Ok(())
    }

    /// Point lookup: cache first, then the durable store.
    pub async fn select(&mut self, id: i64) -> Result<Option<E>, RepoError> {
        if self.caching() {
            match self.cache.get::<E>(id).await {
                Ok(Some(entity)) => return Ok(Some(entity)),
                Ok(None) => {}
                Err(err) => Self::degraded("get", &err),
            }
        }

        let entity = self.entity_manager.select::<E>(id).await?;
        if let Some(entity) = &entity {
            self.populate(entity).await;
        }
        Ok(entity)
    }

    /// Always durable; the match, if any, warms the cache.
    pub async fn select_by(&mut self, query: Query<E>) -> Result<Option<E>, RepoError> {
        let entity = self.entity_manager.select_by(query).await?;
        if let Some(entity) = &entity {
            self.populate(entity).await;
        }
        Ok(entity)
    }

    /// Always durable; every item warms the cache.
    pub async fn select_all(&mut self, query: Query<E>) -> Result<Vec<E>, RepoError> {
        let entities = self.entity_manager.select_all(query).await?;
        for entity in &entities {
            self.populate(entity).await;
        }
        Ok(entities)
    }

    /// Cached only when committed right away.
    pub async fn insert(&mut self, entity: &mut E, commit: Commit) -> Result<(), RepoError> {
        self.entity_manager.insert(entity, commit).await?;
        if commit == Commit::Now {
            self.populate(entity).await;
        }
        Ok(())
    }

    /// `Commit::Now` refreshes the entry; a deferred update drops it until
    /// committed state is cached again.
    pub async fn update(&mut self, entity: &mut E, commit: Commit) -> Result<(), RepoError> {
        self.entity_manager.update(entity, commit).await?;
        match commit {
            Commit::Now => self.refresh(entity).await,
            Commit::Deferred => self.invalidate(entity).await,
        }
    }

    /// The entry is dropped whatever the commit mode.
    pub async fn delete(&mut self, entity: &E, commit: Commit) -> Result<(), RepoError> {
        self.entity_manager.delete(entity, commit).await?;
        self.invalidate(entity).await
    }

    /// Durable batch delete; cacheable types also lose every cached entry.
    pub async fn delete_all(&mut self, query: Query<E>, commit: Commit) -> Result<u64, RepoError> {
        let deleted = self.entity_manager.delete_all(query, commit).await?;
        if deleted > 0 {
            self.invalidate_all().await?;
        }
        Ok(deleted)
    }

    /// Cache `entity` as committed state. When the write fails the entry is
    /// dropped instead so an older copy cannot linger.
    pub async fn refresh(&mut self, entity: &E) -> Result<(), RepoError> {
        if !self.caching() {
            return Ok(());
        }
        if self.entity_manager.has_pending_writes() {
            return self.invalidate(entity).await;
        }
        if let Err(err) = self.cache.set(entity).await {
            Self::degraded("set", &err);
            self.invalidate(entity).await?;
        }
        Ok(())
    }

    pub async fn exists(&mut self, query: Query<E>) -> Result<bool, RepoError> {
        self.entity_manager.exists(query).await
    }

    pub async fn count_all(&mut self, query: Query<E>) -> Result<u64, RepoError> {
        self.entity_manager.count_all(query).await
    }

    pub async fn sum_all(&mut self, column: Column<E>, query: Query<E>) -> Result<i64, RepoError> {
        self.entity_manager.sum_all(column, query).await
    }

    pub async fn lock_all(&mut self) -> Result<(), RepoError> {
        self.entity_manager.lock_all::<E>().await
    }

    pub fn subquery(&self, foreign_key: Column<E>, query: Query<E>) -> Subquery {
        self.entity_manager.subquery(foreign_key, query)
    }
}
