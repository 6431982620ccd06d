//! Derived counters on documents and collections.
//!
//! Counters are always recomputed from the child rows while the child
//! tables are locked, never incremented in place, so concurrent writers
//! cannot lose updates. Tables are locked in one fixed order: the document
//! children first, then `documents`.

use tracing::debug;

use crate::application::entity_manager::{Commit, EntityManager};
use crate::application::filter::Query;
use crate::application::repos::RepoError;
use crate::application::repository::Repository;
use crate::cache::CacheManager;
use crate::domain::entities::{Collection, Comment, Document, Download, Favorite, Revision};

/// Lock every table whose rows feed a document counter.
pub async fn lock_document_children(entity_manager: &mut EntityManager) -> Result<(), RepoError> {
    entity_manager.lock_all::<Revision>().await?;
    entity_manager.lock_all::<Comment>().await?;
    entity_manager.lock_all::<Download>().await?;
    entity_manager.lock_all::<Favorite>().await
}

fn to_counter(value: u64, column: &'static str) -> Result<i64, RepoError> {
    i64::try_from(value).map_err(|_| RepoError::Integrity {
        message: format!("{column} exceeds the counter range"),
    })
}

/// Recompute every counter of one document and store it.
///
/// Returns `None` when the document does not exist.
pub async fn recount_document(
    entity_manager: &mut EntityManager,
    cache: &CacheManager,
    document_id: i64,
    commit: Commit,
) -> Result<Option<Document>, RepoError> {
    lock_document_children(entity_manager).await?;
    let Some(mut document) = entity_manager.select::<Document>(document_id).await? else {
        return Ok(None);
    };

    let revisions = Query::<Revision>::all().filter(Revision::DOCUMENT_ID.eq(document_id));
    document.revisions_count = to_counter(
        entity_manager.count_all(revisions.clone()).await?,
        "revisions_count",
    )?;
    document.revisions_size = entity_manager
        .sum_all(Revision::FILESIZE, revisions)
        .await?;
    document.comments_count = to_counter(
        entity_manager
            .count_all(Query::<Comment>::all().filter(Comment::DOCUMENT_ID.eq(document_id)))
            .await?,
        "comments_count",
    )?;
    document.downloads_count = to_counter(
        entity_manager
            .count_all(Query::<Download>::all().filter(Download::DOCUMENT_ID.eq(document_id)))
            .await?,
        "downloads_count",
    )?;
    document.favorites_count = to_counter(
        entity_manager
            .count_all(Query::<Favorite>::all().filter(Favorite::DOCUMENT_ID.eq(document_id)))
            .await?,
        "favorites_count",
    )?;

    Repository::<Document>::new(entity_manager, cache)
        .update(&mut document, commit)
        .await?;
    debug!(
        document_id,
        revisions = document.revisions_count,
        comments = document.comments_count,
        "document counters recomputed"
    );
    Ok(Some(document))
}

/// Recompute the document count and total size of one collection.
pub async fn recount_collection(
    entity_manager: &mut EntityManager,
    cache: &CacheManager,
    collection_id: i64,
    commit: Commit,
) -> Result<Option<Collection>, RepoError> {
    entity_manager.lock_all::<Document>().await?;
    let Some(mut collection) = entity_manager.select::<Collection>(collection_id).await? else {
        return Ok(None);
    };

    let documents = Query::<Document>::all().filter(Document::COLLECTION_ID.eq(collection_id));
    collection.documents_count = to_counter(
        entity_manager.count_all(documents.clone()).await?,
        "documents_count",
    )?;
    collection.documents_size = entity_manager
        .sum_all(Document::REVISIONS_SIZE, documents)
        .await?;

    Repository::<Collection>::new(entity_manager, cache)
        .update(&mut collection, commit)
        .await?;
    debug!(
        collection_id,
        documents = collection.documents_count,
        "collection counters recomputed"
    );
    Ok(Some(collection))
}
