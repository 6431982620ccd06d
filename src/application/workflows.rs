//! Capability-gated operations on the file collection.
//!
//! Every flow runs inside the caller's [`RequestScope`]: the before-hook
//! sees the candidate entity, the mutation and any counter recompute are
//! staged in the scope transaction, the after-hook sees the stored entity,
//! and the scope is committed last. Any error rolls the whole unit back,
//! including rows written by hook handlers.
//!
//! Parents whose counters changed, and entities a flow deleted, are
//! evicted from the cache once more after the commit, since a concurrent
//! reader may have cached the pre-commit row in between.

use thiserror::Error;
use tracing::{info, warn};

use crate::application::counters::{lock_document_children, recount_collection, recount_document};
use crate::application::entity_manager::Commit;
use crate::application::filter::Query;
use crate::application::hooks::{Action, HookError, HookName, Payload, Target};
use crate::application::repos::RepoError;
use crate::application::scope::RequestScope;
use crate::domain::entities::{
    Collection, Comment, Document, Download, Favorite, Revision, Tag, User,
};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("access denied: {action}")]
    AccessDenied { action: &'static str },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Hook(#[from] HookError),
}

impl WorkflowError {
    fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Id of the current user when it passes `allowed`.
fn authorize(
    scope: &RequestScope,
    allowed: fn(&User) -> bool,
    action: &'static str,
) -> Result<i64, WorkflowError> {
    scope
        .user()
        .filter(|user| allowed(user))
        .and_then(|user| user.id)
        .ok_or(WorkflowError::AccessDenied { action })
}

/// Commit on success, roll back on failure. A failed rollback is logged;
/// the original error is what the caller sees.
async fn settle<T>(
    scope: &mut RequestScope,
    result: Result<T, WorkflowError>,
) -> Result<T, WorkflowError> {
    match result {
        Ok(value) => {
            scope.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = scope.rollback().await {
                warn!(
                    request_id = %scope.request().request_id,
                    error = %rollback,
                    "rollback after failed workflow also failed"
                );
            }
            Err(err)
        }
    }
}

async fn load_document(scope: &mut RequestScope, id: i64) -> Result<Document, WorkflowError> {
    scope
        .repository::<Document>()
        .select(id)
        .await?
        .ok_or_else(|| WorkflowError::not_found("document", id))
}

/// Register a new account. Usernames are unique.
pub async fn register_user(scope: &mut RequestScope, user: User) -> Result<User, WorkflowError> {
    let result = async {
        let mut user = scope
            .dispatcher()
            .run(HookName::before(Target::User, Action::Insert), user)
            .await?;
        let taken = scope
            .repository::<User>()
            .exists(Query::all().filter(User::USERNAME.eq(user.username.as_str())))
            .await?;
        if taken {
            return Err(WorkflowError::Conflict {
                message: format!("username `{}` is taken", user.username),
            });
        }

        scope
            .repository::<User>()
            .insert(&mut user, Commit::Deferred)
            .await?;
        let mut dispatcher = scope.dispatcher();
        let user = dispatcher
            .run(HookName::after(Target::User, Action::Insert), user)
            .await?;
        let user = dispatcher.run(HookName::AfterUserRegister, user).await?;
        Ok::<_, WorkflowError>(user)
    }
    .await;

    let user = settle(scope, result).await?;
    info!(user_id = ?user.id, username = %user.username, "user registered");
    Ok(user)
}

pub async fn create_collection(
    scope: &mut RequestScope,
    name: &str,
) -> Result<Collection, WorkflowError> {
    let user_id = authorize(scope, User::can_write, "create_collection")?;
    let result = async {
        let mut collection = scope
            .dispatcher()
            .run(
                HookName::before(Target::Collection, Action::Insert),
                Collection::new(user_id, name),
            )
            .await?;
        scope
            .repository::<Collection>()
            .insert(&mut collection, Commit::Deferred)
            .await?;
        let collection = scope
            .dispatcher()
            .run(HookName::after(Target::Collection, Action::Insert), collection)
            .await?;
        Ok::<_, WorkflowError>(collection)
    }
    .await;

    settle(scope, result).await
}

pub async fn create_document(
    scope: &mut RequestScope,
    collection_id: i64,
    name: &str,
) -> Result<Document, WorkflowError> {
    let user_id = authorize(scope, User::can_write, "create_document")?;
    let result = async {
        scope.entity_manager().lock_all::<Document>().await?;
        let collection = scope
            .repository::<Collection>()
            .select(collection_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("collection", collection_id))?;

        let mut document = scope
            .dispatcher()
            .run(
                HookName::before(Target::Document, Action::Insert),
                Document::new(user_id, collection_id, name),
            )
            .await?;
        scope
            .repository::<Document>()
            .insert(&mut document, Commit::Deferred)
            .await?;

        let cache = scope.cache().clone();
        recount_collection(scope.entity_manager(), &cache, collection_id, Commit::Deferred).await?;
        let document = scope
            .dispatcher()
            .run(HookName::after(Target::Document, Action::Insert), document)
            .await?;
        Ok::<_, WorkflowError>((collection, document))
    }
    .await;

    let (collection, document) = settle(scope, result).await?;
    scope.repository::<Collection>().invalidate(&collection).await?;
    Ok(document)
}

/// Store a new file version and recompute the document and collection
/// counters it feeds.
pub async fn add_revision(
    scope: &mut RequestScope,
    document_id: i64,
    original_filename: &str,
    mimetype: &str,
    filesize: i64,
) -> Result<Revision, WorkflowError> {
    let user_id = authorize(scope, User::can_write, "add_revision")?;
    let result = async {
        lock_document_children(scope.entity_manager()).await?;
        let document = load_document(scope, document_id).await?;

        let mut revision = scope
            .dispatcher()
            .run(
                HookName::before(Target::Revision, Action::Insert),
                Revision::new(user_id, document_id, original_filename, mimetype, filesize),
            )
            .await?;
        scope
            .repository::<Revision>()
            .insert(&mut revision, Commit::Deferred)
            .await?;

        let cache = scope.cache().clone();
        let document = recount_document(scope.entity_manager(), &cache, document_id, Commit::Deferred)
            .await?
            .unwrap_or(document);
        let collection = recount_collection(
            scope.entity_manager(),
            &cache,
            document.collection_id,
            Commit::Deferred,
        )
        .await?;

        let revision = scope
            .dispatcher()
            .run(HookName::after(Target::Revision, Action::Insert), revision)
            .await?;
        Ok::<_, WorkflowError>((document, collection, revision))
    }
    .await;

    let (document, collection, revision) = settle(scope, result).await?;
    scope.repository::<Document>().invalidate(&document).await?;
    if let Some(collection) = collection {
        scope.repository::<Collection>().invalidate(&collection).await?;
    }
    Ok(revision)
}

pub async fn add_comment(
    scope: &mut RequestScope,
    document_id: i64,
    content: &str,
) -> Result<Comment, WorkflowError> {
    let user_id = authorize(scope, User::can_write, "add_comment")?;
    let result = async {
        lock_document_children(scope.entity_manager()).await?;
        let document = load_document(scope, document_id).await?;

        let mut comment = scope
            .dispatcher()
            .run(
                HookName::before(Target::Comment, Action::Insert),
                Comment::new(user_id, document_id, content),
            )
            .await?;
        scope
            .repository::<Comment>()
            .insert(&mut comment, Commit::Deferred)
            .await?;

        let cache = scope.cache().clone();
        recount_document(scope.entity_manager(), &cache, document_id, Commit::Deferred).await?;
        let comment = scope
            .dispatcher()
            .run(HookName::after(Target::Comment, Action::Insert), comment)
            .await?;
        Ok::<_, WorkflowError>((document, comment))
    }
    .await;

    let (document, comment) = settle(scope, result).await?;
    scope.repository::<Document>().invalidate(&document).await?;
    Ok(comment)
}

/// Remove a comment. Authors may delete their own; editors any.
pub async fn delete_comment(scope: &mut RequestScope, comment_id: i64) -> Result<(), WorkflowError> {
    let user_id = authorize(scope, User::can_read, "delete_comment")?;
    let can_edit = scope.user().is_some_and(User::can_edit);
    let result = async {
        lock_document_children(scope.entity_manager()).await?;
        let comment = scope
            .repository::<Comment>()
            .select(comment_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("comment", comment_id))?;
        if comment.user_id != user_id && !can_edit {
            return Err(WorkflowError::AccessDenied {
                action: "delete_comment",
            });
        }

        let comment = scope
            .dispatcher()
            .run(HookName::before(Target::Comment, Action::Delete), comment)
            .await?;
        scope
            .repository::<Comment>()
            .delete(&comment, Commit::Deferred)
            .await?;

        let cache = scope.cache().clone();
        let document =
            recount_document(scope.entity_manager(), &cache, comment.document_id, Commit::Deferred)
                .await?;
        let comment = scope
            .dispatcher()
            .run(HookName::after(Target::Comment, Action::Delete), comment)
            .await?;
        Ok::<_, WorkflowError>((comment, document))
    }
    .await;

    let (comment, document) = settle(scope, result).await?;
    scope.repository::<Comment>().invalidate(&comment).await?;
    if let Some(document) = document {
        scope.repository::<Document>().invalidate(&document).await?;
    }
    Ok(())
}

pub async fn record_download(
    scope: &mut RequestScope,
    document_id: i64,
) -> Result<Download, WorkflowError> {
    let user_id = authorize(scope, User::can_read, "record_download")?;
    let result = async {
        lock_document_children(scope.entity_manager()).await?;
        let document = load_document(scope, document_id).await?;

        let mut download = scope
            .dispatcher()
            .run(
                HookName::before(Target::Download, Action::Insert),
                Download::new(user_id, document_id),
            )
            .await?;
        scope
            .repository::<Download>()
            .insert(&mut download, Commit::Deferred)
            .await?;

        let cache = scope.cache().clone();
        recount_document(scope.entity_manager(), &cache, document_id, Commit::Deferred).await?;
        let download = scope
            .dispatcher()
            .run(HookName::after(Target::Download, Action::Insert), download)
            .await?;
        Ok::<_, WorkflowError>((document, download))
    }
    .await;

    let (document, download) = settle(scope, result).await?;
    scope.repository::<Document>().invalidate(&document).await?;
    Ok(download)
}

/// Flip the current user's favorite on a document; returns whether it is
/// now a favorite.
pub async fn toggle_favorite(
    scope: &mut RequestScope,
    document_id: i64,
) -> Result<bool, WorkflowError> {
    let user_id = authorize(scope, User::can_read, "toggle_favorite")?;
    let result = async {
        lock_document_children(scope.entity_manager()).await?;
        let document = load_document(scope, document_id).await?;

        let existing = scope
            .repository::<Favorite>()
            .select_by(
                Query::all()
                    .filter(Favorite::USER_ID.eq(user_id))
                    .filter(Favorite::DOCUMENT_ID.eq(document_id)),
            )
            .await?;

        let removed = match existing {
            Some(favorite) => {
                let favorite = scope
                    .dispatcher()
                    .run(HookName::before(Target::Favorite, Action::Delete), favorite)
                    .await?;
                scope
                    .repository::<Favorite>()
                    .delete(&favorite, Commit::Deferred)
                    .await?;
                let favorite = scope
                    .dispatcher()
                    .run(HookName::after(Target::Favorite, Action::Delete), favorite)
                    .await?;
                Some(favorite)
            }
            None => {
                let mut favorite = scope
                    .dispatcher()
                    .run(
                        HookName::before(Target::Favorite, Action::Insert),
                        Favorite::new(user_id, document_id),
                    )
                    .await?;
                scope
                    .repository::<Favorite>()
                    .insert(&mut favorite, Commit::Deferred)
                    .await?;
                scope
                    .dispatcher()
                    .run(HookName::after(Target::Favorite, Action::Insert), favorite)
                    .await?;
                None
            }
        };

        let cache = scope.cache().clone();
        recount_document(scope.entity_manager(), &cache, document_id, Commit::Deferred).await?;
        Ok::<_, WorkflowError>((document, removed))
    }
    .await;

    let (document, removed) = settle(scope, result).await?;
    scope.repository::<Document>().invalidate(&document).await?;
    if let Some(favorite) = &removed {
        scope.repository::<Favorite>().invalidate(favorite).await?;
    }
    Ok(removed.is_none())
}

pub async fn tag_document(
    scope: &mut RequestScope,
    document_id: i64,
    value: &str,
) -> Result<Tag, WorkflowError> {
    authorize(scope, User::can_write, "tag_document")?;
    let result = async {
        load_document(scope, document_id).await?;
        let mut tag = scope
            .dispatcher()
            .run(
                HookName::before(Target::Tag, Action::Insert),
                Tag::new(document_id, value),
            )
            .await?;
        scope
            .repository::<Tag>()
            .insert(&mut tag, Commit::Deferred)
            .await?;
        let tag = scope
            .dispatcher()
            .run(HookName::after(Target::Tag, Action::Insert), tag)
            .await?;
        Ok::<_, WorkflowError>(tag)
    }
    .await;

    settle(scope, result).await
}

/// Delete a document with every child row, then recount its collection.
/// Owners may delete their documents; editors any.
pub async fn delete_document(scope: &mut RequestScope, document_id: i64) -> Result<(), WorkflowError> {
    let user_id = authorize(scope, User::can_write, "delete_document")?;
    let can_edit = scope.user().is_some_and(User::can_edit);
    let result = async {
        lock_document_children(scope.entity_manager()).await?;
        scope.entity_manager().lock_all::<Document>().await?;
        let document = load_document(scope, document_id).await?;
        if document.user_id != user_id && !can_edit {
            return Err(WorkflowError::AccessDenied {
                action: "delete_document",
            });
        }

        let document = scope
            .dispatcher()
            .run(HookName::before(Target::Document, Action::Delete), document)
            .await?;

        scope
            .repository::<Revision>()
            .delete_all(
                Query::all().filter(Revision::DOCUMENT_ID.eq(document_id)),
                Commit::Deferred,
            )
            .await?;
        scope
            .repository::<Comment>()
            .delete_all(
                Query::all().filter(Comment::DOCUMENT_ID.eq(document_id)),
                Commit::Deferred,
            )
            .await?;
        scope
            .repository::<Download>()
            .delete_all(
                Query::all().filter(Download::DOCUMENT_ID.eq(document_id)),
                Commit::Deferred,
            )
            .await?;
        scope
            .repository::<Favorite>()
            .delete_all(
                Query::all().filter(Favorite::DOCUMENT_ID.eq(document_id)),
                Commit::Deferred,
            )
            .await?;
        scope
            .repository::<Tag>()
            .delete_all(
                Query::all().filter(Tag::DOCUMENT_ID.eq(document_id)),
                Commit::Deferred,
            )
            .await?;
        scope
            .repository::<Document>()
            .delete(&document, Commit::Deferred)
            .await?;

        let cache = scope.cache().clone();
        let collection = recount_collection(
            scope.entity_manager(),
            &cache,
            document.collection_id,
            Commit::Deferred,
        )
        .await?;
        let document = scope
            .dispatcher()
            .run(HookName::after(Target::Document, Action::Delete), document)
            .await?;
        Ok::<_, WorkflowError>((document, collection))
    }
    .await;

    let (document, collection) = settle(scope, result).await?;
    scope.repository::<Document>().invalidate(&document).await?;
    scope.repository::<Revision>().invalidate_all().await?;
    scope.repository::<Comment>().invalidate_all().await?;
    scope.repository::<Download>().invalidate_all().await?;
    scope.repository::<Favorite>().invalidate_all().await?;
    scope.repository::<Tag>().invalidate_all().await?;
    if let Some(collection) = collection {
        scope.repository::<Collection>().invalidate(&collection).await?;
    }
    Ok(())
}

/// List documents through the query-string filter DSL, optionally
/// restricted to documents carrying `tag`.
pub async fn list_documents<I, K, V>(
    scope: &mut RequestScope,
    params: I,
    tag: Option<&str>,
) -> Result<Vec<Document>, WorkflowError>
where
    I: IntoIterator<Item = (K, Option<V>)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    authorize(scope, User::can_read, "list_documents")?;
    let query = Query::<Document>::from_params(params).map_err(RepoError::from);
    let result = async {
        let mut query = query?;
        scope
            .dispatch(HookName::before(Target::Document, Action::List), Payload::Empty)
            .await?;
        if let Some(tag) = tag {
            let tagged = scope
                .entity_manager()
                .subquery(Tag::DOCUMENT_ID, Query::all().filter(Tag::VALUE.eq(tag)));
            query = query.subquery(tagged);
        }

        let documents = scope.repository::<Document>().select_all(query).await?;
        let documents = scope
            .dispatcher()
            .run(HookName::after(Target::Document, Action::List), documents)
            .await?;
        Ok::<_, WorkflowError>(documents)
    }
    .await;

    settle(scope, result).await
}
