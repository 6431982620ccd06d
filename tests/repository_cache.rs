mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use docvault::application::entity_manager::Commit;
use docvault::application::filter::Query;
use docvault::application::repos::RepoError;
use docvault::application::repository::Repository;
use docvault::cache::{CacheConfig, CacheManager, CacheStore};
use docvault::domain::entities::{AuditLog, Collection, Download, Tag};
use docvault::infra::db::MemoryDatabase;

use common::{FlakyStore, RecordingStore, manager, memory_cache};

#[tokio::test]
async fn insert_update_delete_keep_cache_and_store_in_step() {
    let database = MemoryDatabase::new();
    let cache = memory_cache();
    let mut em = manager(&database);
    let mut repo = Repository::<Collection>::new(&mut em, &cache);

    let mut collection = Collection::new(1, "contracts");
    repo.insert(&mut collection, Commit::Now)
        .await
        .expect("insert");
    let id = collection.id.expect("id assigned");
    assert_eq!(
        cache.get::<Collection>(id).await.expect("cache get"),
        Some(collection.clone())
    );

    collection.summary = Some("signed copies".to_string());
    repo.update(&mut collection, Commit::Deferred)
        .await
        .expect("deferred update");
    assert!(cache.get::<Collection>(id).await.expect("cache get").is_none());

    collection.name = "contracts-2026".to_string();
    repo.update(&mut collection, Commit::Now)
        .await
        .expect("update");
    assert_eq!(
        cache.get::<Collection>(id).await.expect("cache get"),
        Some(collection.clone())
    );
    assert_eq!(repo.select(id).await.expect("select"), Some(collection.clone()));

    repo.delete(&collection, Commit::Now).await.expect("delete");
    assert!(cache.get::<Collection>(id).await.expect("cache get").is_none());
    assert_eq!(repo.select(id).await.expect("select"), None);
    assert_eq!(database.committed_len("collections").await, 0);
}

#[tokio::test]
async fn insert_populates_only_when_committed() {
    let database = MemoryDatabase::new();
    let cache = memory_cache();
    let mut em = manager(&database);
    let mut repo = Repository::<Collection>::new(&mut em, &cache);

    let mut deferred = Collection::new(1, "staged");
    repo.insert(&mut deferred, Commit::Deferred)
        .await
        .expect("insert");
    let deferred_id = deferred.id.expect("id");
    assert!(
        cache
            .get::<Collection>(deferred_id)
            .await
            .expect("cache get")
            .is_none()
    );

    let mut committed = Collection::new(1, "final");
    repo.insert(&mut committed, Commit::Now)
        .await
        .expect("insert");
    let committed_id = committed.id.expect("id");
    assert_eq!(
        cache.get::<Collection>(committed_id).await.expect("cache get"),
        Some(committed)
    );
}

#[tokio::test]
async fn deferred_update_drops_a_warm_entry() {
    let database = MemoryDatabase::new();
    let cache = memory_cache();
    let mut em = manager(&database);

    let mut collection = Collection::new(1, "warm");
    Repository::<Collection>::new(&mut em, &cache)
        .insert(&mut collection, Commit::Now)
        .await
        .expect("insert");
    let id = collection.id.expect("id");

    // A different unit of work warms the entry through a read.
    let mut reader = manager(&database);
    Repository::<Collection>::new(&mut reader, &cache)
        .select(id)
        .await
        .expect("select");
    assert!(cache.get::<Collection>(id).await.expect("cache get").is_some());

    collection.name = "cold".to_string();
    let mut repo = Repository::<Collection>::new(&mut em, &cache);
    repo.update(&mut collection, Commit::Deferred)
        .await
        .expect("update");
    assert!(cache.get::<Collection>(id).await.expect("cache get").is_none());

    repo.refresh(&collection).await.expect("refresh");
    assert!(
        cache.get::<Collection>(id).await.expect("cache get").is_none(),
        "uncommitted state is never cached"
    );
}

#[tokio::test]
async fn uncacheable_types_never_touch_the_store() {
    let database = MemoryDatabase::new();
    let recording = Arc::new(RecordingStore::new());
    let store: Arc<dyn CacheStore> = recording.clone();
    let cache = CacheManager::new(store, &CacheConfig::default());
    let mut em = manager(&database);

    {
        let mut downloads = Repository::<Download>::new(&mut em, &cache);
        let mut download = Download::new(1, 1);
        downloads
            .insert(&mut download, Commit::Now)
            .await
            .expect("insert");
        let id = download.id.expect("id");
        downloads.select(id).await.expect("select");
        downloads
            .select_by(Query::all().filter(Download::USER_ID.eq(1)))
            .await
            .expect("select_by");
        downloads
            .update(&mut download, Commit::Deferred)
            .await
            .expect("deferred update");
        downloads
            .update(&mut download, Commit::Now)
            .await
            .expect("update");
        downloads
            .delete(&download, Commit::Now)
            .await
            .expect("delete");
    }
    {
        let mut tags = Repository::<Tag>::new(&mut em, &cache);
        for value in ["a", "b"] {
            tags.insert(&mut Tag::new(1, value), Commit::Now)
                .await
                .expect("insert");
        }
        tags.select_all(Query::all()).await.expect("select_all");
        let deleted = tags
            .delete_all(Query::all(), Commit::Now)
            .await
            .expect("delete_all");
        assert_eq!(deleted, 2);
    }
    Repository::<AuditLog>::new(&mut em, &cache)
        .insert(&mut AuditLog::new(None, "manual"), Commit::Now)
        .await
        .expect("insert");

    assert!(recording.calls().is_empty(), "calls: {:?}", recording.calls());

    let mut collection = Collection::new(1, "control");
    Repository::<Collection>::new(&mut em, &cache)
        .insert(&mut collection, Commit::Now)
        .await
        .expect("insert");
    assert_eq!(recording.calls(), vec!["set collections:1".to_string()]);
}

#[tokio::test]
async fn cache_hit_is_not_written_back() {
    let database = MemoryDatabase::new();
    let recording = Arc::new(RecordingStore::new());
    let store: Arc<dyn CacheStore> = recording.clone();
    let cache = CacheManager::new(store, &CacheConfig::default());
    let mut em = manager(&database);
    let mut repo = Repository::<Collection>::new(&mut em, &cache);

    let mut collection = Collection::new(1, "hot");
    repo.insert(&mut collection, Commit::Now)
        .await
        .expect("insert");
    repo.select(collection.id.expect("id"))
        .await
        .expect("select");

    assert_eq!(
        recording.calls(),
        vec!["set collections:1".to_string(), "get collections:1".to_string()]
    );
}

#[tokio::test]
async fn failing_cache_reads_and_writes_degrade_to_the_store() {
    let database = MemoryDatabase::new();
    let flaky = Arc::new(FlakyStore::new());
    let store: Arc<dyn CacheStore> = flaky.clone();
    let cache = CacheManager::new(store, &CacheConfig::default());
    let mut em = manager(&database);
    let mut repo = Repository::<Collection>::new(&mut em, &cache);

    flaky.fail_writes.store(true, Ordering::SeqCst);
    let mut collection = Collection::new(1, "resilient");
    repo.insert(&mut collection, Commit::Now)
        .await
        .expect("insert survives a failed population");
    let id = collection.id.expect("id");

    flaky.fail_reads.store(true, Ordering::SeqCst);
    assert_eq!(
        repo.select(id).await.expect("select falls back"),
        Some(collection)
    );
}

#[tokio::test]
async fn failing_invalidation_is_reported() {
    let database = MemoryDatabase::new();
    let flaky = Arc::new(FlakyStore::new());
    let store: Arc<dyn CacheStore> = flaky.clone();
    let cache = CacheManager::new(store, &CacheConfig::default());
    let mut em = manager(&database);
    let mut repo = Repository::<Collection>::new(&mut em, &cache);

    let mut collection = Collection::new(1, "sticky");
    repo.insert(&mut collection, Commit::Now)
        .await
        .expect("insert");

    flaky.fail_all();
    collection.name = "changed".to_string();
    let err = repo
        .update(&mut collection, Commit::Deferred)
        .await
        .expect_err("invalidation failure surfaces");
    assert!(matches!(err, RepoError::Cache(_)));
}
