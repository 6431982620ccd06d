mod common;

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use docvault::application::entity_manager::Commit;
use docvault::application::repository::Repository;
use docvault::cache::{
    CacheConfig, CacheManager, CacheStore, METRIC_CACHE_ERROR, METRIC_CACHE_EVICT,
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, MemoryCacheStore,
};
use docvault::domain::entities::Collection;
use docvault::infra::db::MemoryDatabase;
use metrics_util::debugging::DebuggingRecorder;

use common::{FlakyStore, manager};

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let database = MemoryDatabase::new();
    let mut em = manager(&database);

    // Capacity 1: the second population evicts the first.
    let store: Arc<dyn CacheStore> =
        Arc::new(MemoryCacheStore::with_capacity(NonZeroUsize::MIN));
    let cache = CacheManager::new(store, &CacheConfig::default());
    let mut repo = Repository::<Collection>::new(&mut em, &cache);
    let mut first = Collection::new(1, "first");
    repo.insert(&mut first, Commit::Now).await.expect("insert");
    repo.select(first.id.expect("id")).await.expect("hit");
    let mut second = Collection::new(1, "second");
    repo.insert(&mut second, Commit::Now).await.expect("insert");
    repo.select(first.id.expect("id")).await.expect("miss");

    // Failing reads are counted and fall back to the store.
    let flaky = Arc::new(FlakyStore::new());
    flaky.fail_all();
    let store: Arc<dyn CacheStore> = flaky;
    let broken = CacheManager::new(store, &CacheConfig::default());
    let mut repo = Repository::<Collection>::new(&mut em, &broken);
    repo.select(second.id.expect("id"))
        .await
        .expect("store fallback");

    let observed: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for expected in [
        METRIC_CACHE_HIT,
        METRIC_CACHE_MISS,
        METRIC_CACHE_EVICT,
        METRIC_CACHE_ERROR,
    ] {
        assert!(
            observed.contains(expected),
            "missing metric key: {expected}; observed={observed:?}"
        );
    }
}
