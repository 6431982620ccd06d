#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use docvault::application::entity_manager::{Commit, EntityManager};
use docvault::application::hooks::HookRegistry;
use docvault::application::scope::{RequestContext, RequestScope};
use docvault::cache::{CacheConfig, CacheError, CacheManager, CacheStore, MemoryCacheStore};
use docvault::domain::entities::User;
use docvault::domain::types::UserRole;
use docvault::infra::db::MemoryDatabase;

/// Cache store that logs every call before delegating to memory.
pub struct RecordingStore {
    inner: MemoryCacheStore,
    calls: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryCacheStore::new(&CacheConfig::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, op: &str, key: &str) {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("{op} {key}"));
    }
}

#[async_trait]
impl CacheStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.record("get", key);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.record("set", key);
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.record("delete", key);
        self.inner.delete(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.record("keys", pattern);
        self.inner.keys(pattern).await
    }
}

/// Cache store whose operations can be switched to fail.
pub struct FlakyStore {
    inner: MemoryCacheStore,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryCacheStore::new(&CacheConfig::default()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_all(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
        self.fail_writes.store(true, Ordering::SeqCst);
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            Err(CacheError::store("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        Self::check(&self.fail_reads)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), CacheError> {
        Self::check(&self.fail_writes)?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Self::check(&self.fail_deletes)?;
        self.inner.delete(key).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        Self::check(&self.fail_reads)?;
        self.inner.keys(pattern).await
    }
}

pub fn memory_cache() -> CacheManager {
    CacheManager::in_memory(&CacheConfig::default())
}

pub fn manager(database: &MemoryDatabase) -> EntityManager {
    EntityManager::new(Arc::new(database.clone()))
}

pub fn scope(database: &MemoryDatabase, cache: &CacheManager, hooks: Arc<HookRegistry>) -> RequestScope {
    RequestScope::new(
        Arc::new(database.clone()),
        cache.clone(),
        hooks,
        RequestContext::new(),
    )
}

/// Insert and commit a user with `role`.
pub async fn seed_user(database: &MemoryDatabase, username: &str, role: UserRole) -> User {
    let mut em = manager(database);
    let mut user = User::new(username, format!("{username}@example.com"), role);
    em.insert(&mut user, Commit::Now).await.expect("seed user");
    user
}
