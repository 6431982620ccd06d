//! Unit of work over a durable store.
//!
//! An [`EntityManager`] opens a transaction on first use and keeps it until
//! [`EntityManager::commit`] or [`EntityManager::rollback`]; the next call
//! after that opens a fresh one. Dropping a manager with an open
//! transaction discards its staged writes.

use std::sync::Arc;

use tracing::debug;

use crate::application::filter::{Direction, OrderBy, Query, Subquery};
use crate::application::repos::{Database, RepoError, Transaction};
use crate::domain::schema::{Column, Entity, ID_COLUMN, timestamp_now};

/// Rows fetched per round while deleting by filter.
pub const DELETE_BATCH_SIZE: u64 = 500;

/// Transaction boundary requested by a mutating call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// Commit the unit of work once the call succeeds.
    Now,
    /// Leave the write staged for a later [`EntityManager::commit`].
    Deferred,
}

pub struct EntityManager {
    database: Arc<dyn Database>,
    transaction: Option<Box<dyn Transaction>>,
    pending_writes: bool,
}

impl EntityManager {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self {
            database,
            transaction: None,
            pending_writes: false,
        }
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Whether the open transaction holds writes not yet committed.
    pub fn has_pending_writes(&self) -> bool {
        self.pending_writes
    }

    async fn transaction(&mut self) -> Result<&mut Box<dyn Transaction>, RepoError> {
        if self.transaction.is_none() {
            self.transaction = Some(self.database.begin().await?);
            debug!(op = "begin", "transaction opened");
        }
        self.transaction
            .as_mut()
            .ok_or_else(|| RepoError::from_persistence("transaction unavailable"))
    }

    async fn finish(&mut self, commit: Commit) -> Result<(), RepoError> {
        match commit {
            Commit::Now => self.commit().await,
            Commit::Deferred => Ok(()),
        }
    }

    /// Whether at least one row matches.
    pub async fn exists<E: Entity>(&mut self, query: Query<E>) -> Result<bool, RepoError> {
        let mut spec = query.into_spec();
        spec.order = None;
        spec.limit = Some(1);

        let rows = self
            .transaction()
            .await?
            .select(E::TABLE, &[ID_COLUMN], &spec)
            .await?;
        let found = !rows.is_empty();
        debug!(table = E::TABLE, op = "exists", found);
        Ok(found)
    }

    /// Stage `entity` and assign its generated id.
    pub async fn insert<E: Entity>(&mut self, entity: &mut E, commit: Commit) -> Result<(), RepoError> {
        let row = entity.to_row()?;
        let id = self.transaction().await?.insert(E::TABLE, row).await?;
        entity.assign_id(id);
        self.pending_writes = true;
        debug!(table = E::TABLE, op = "insert", id, ?commit);
        self.finish(commit).await
    }

    pub async fn select<E: Entity>(&mut self, id: i64) -> Result<Option<E>, RepoError> {
        let id_column = Column::<E>::int(ID_COLUMN.name);
        self.select_by(Query::all().filter(id_column.eq(id))).await
    }

    /// First row matching `query`, in the query's order.
    pub async fn select_by<E: Entity>(&mut self, query: Query<E>) -> Result<Option<E>, RepoError> {
        let mut spec = query.into_spec();
        spec.limit = Some(1);

        let row = self
            .transaction()
            .await?
            .select(E::TABLE, E::COLUMNS, &spec)
            .await?
            .into_iter()
            .next();
        debug!(table = E::TABLE, op = "select_by", found = row.is_some());
        Ok(row.map(E::from_row).transpose()?)
    }

    pub async fn select_all<E: Entity>(&mut self, query: Query<E>) -> Result<Vec<E>, RepoError> {
        let rows = self
            .transaction()
            .await?
            .select(E::TABLE, E::COLUMNS, query.spec())
            .await?;
        debug!(table = E::TABLE, op = "select_all", rows = rows.len());
        Ok(rows
            .into_iter()
            .map(E::from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    /// Write back `entity`, stamping `updated_date`.
    pub async fn update<E: Entity>(&mut self, entity: &mut E, commit: Commit) -> Result<(), RepoError> {
        let id = entity.id().ok_or_else(|| {
            RepoError::invalid_input(format!("cannot update unsaved `{}` entity", E::TABLE))
        })?;
        entity.touch(timestamp_now());
        let row = entity.to_row()?;

        if !self.transaction().await?.update(E::TABLE, id, row).await? {
            return Err(RepoError::NotFound);
        }
        self.pending_writes = true;
        debug!(table = E::TABLE, op = "update", id, ?commit);
        self.finish(commit).await
    }

    pub async fn delete<E: Entity>(&mut self, entity: &E, commit: Commit) -> Result<(), RepoError> {
        let id = entity.id().ok_or_else(|| {
            RepoError::invalid_input(format!("cannot delete unsaved `{}` entity", E::TABLE))
        })?;

        if !self.transaction().await?.delete(E::TABLE, id).await? {
            return Err(RepoError::NotFound);
        }
        self.pending_writes = true;
        debug!(table = E::TABLE, op = "delete", id, ?commit);
        self.finish(commit).await
    }

    /// Delete every match, [`DELETE_BATCH_SIZE`] rows at a time in id order.
    ///
    /// Ordering and pagination of `query` are ignored.
    pub async fn delete_all<E: Entity>(&mut self, query: Query<E>, commit: Commit) -> Result<u64, RepoError> {
        let mut spec = query.into_spec();
        spec.order = Some(OrderBy {
            column: ID_COLUMN,
            direction: Direction::Asc,
        });
        spec.offset = None;
        spec.limit = Some(DELETE_BATCH_SIZE);

        let mut deleted = 0_u64;
        loop {
            let transaction = self.transaction().await?;
            let batch = transaction.select(E::TABLE, &[ID_COLUMN], &spec).await?;
            for id in batch.iter().filter_map(|row| row.id()) {
                if transaction.delete(E::TABLE, id).await? {
                    deleted += 1;
                }
            }
            if (batch.len() as u64) < DELETE_BATCH_SIZE {
                break;
            }
        }

        if deleted > 0 {
            self.pending_writes = true;
        }
        debug!(table = E::TABLE, op = "delete_all", deleted, ?commit);
        self.finish(commit).await?;
        Ok(deleted)
    }

    pub async fn count_all<E: Entity>(&mut self, query: Query<E>) -> Result<u64, RepoError> {
        let spec = query.spec().unpaged();
        let count = self.transaction().await?.count(E::TABLE, &spec).await?;
        debug!(table = E::TABLE, op = "count_all", count);
        Ok(count)
    }

    /// `SUM(column)` over matches; 0 when nothing matches.
    pub async fn sum_all<E: Entity>(&mut self, column: Column<E>, query: Query<E>) -> Result<i64, RepoError> {
        let spec = query.spec().unpaged();
        let sum = self
            .transaction()
            .await?
            .sum(E::TABLE, column.def(), &spec)
            .await?;
        debug!(table = E::TABLE, op = "sum_all", column = column.name(), sum);
        Ok(sum)
    }

    /// Exclusive lock on the whole table until the unit of work ends.
    pub async fn lock_all<E: Entity>(&mut self) -> Result<(), RepoError> {
        self.transaction().await?.lock_table(E::TABLE).await?;
        debug!(table = E::TABLE, op = "lock_all");
        Ok(())
    }

    /// Projection of `foreign_key` over rows matching `query`, for
    /// [`Query::subquery`].
    pub fn subquery<E: Entity>(&self, foreign_key: Column<E>, query: Query<E>) -> Subquery {
        Subquery {
            table: E::TABLE,
            column: foreign_key.def(),
            predicates: query.into_spec().predicates,
        }
    }

    pub async fn flush(&mut self) -> Result<(), RepoError> {
        match self.transaction.as_mut() {
            Some(transaction) => transaction.flush().await,
            None => Ok(()),
        }
    }

    pub async fn commit(&mut self) -> Result<(), RepoError> {
        self.pending_writes = false;
        let Some(mut transaction) = self.transaction.take() else {
            return Ok(());
        };
        transaction.commit().await?;
        debug!(op = "commit", "transaction committed");
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), RepoError> {
        self.pending_writes = false;
        let Some(mut transaction) = self.transaction.take() else {
            return Ok(());
        };
        transaction.rollback().await?;
        debug!(op = "rollback", "transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Comment, Revision};
    use crate::infra::db::MemoryDatabase;

    fn manager() -> (MemoryDatabase, EntityManager) {
        let database = MemoryDatabase::new();
        let manager = EntityManager::new(Arc::new(database.clone()));
        (database, manager)
    }

    #[tokio::test]
    async fn insert_assigns_id_and_defers_commit() {
        let (database, mut em) = manager();
        let mut comment = Comment::new(1, 1, "first");
        em.insert(&mut comment, Commit::Deferred)
            .await
            .expect("insert");

        let id = comment.id.expect("id assigned before commit");
        assert!(em.has_pending_writes());
        assert_eq!(database.committed_len("comments").await, 0);
        assert_eq!(
            em.select::<Comment>(id).await.expect("select"),
            Some(comment.clone())
        );

        em.commit().await.expect("commit");
        assert!(!em.has_pending_writes());
        assert_eq!(database.committed_len("comments").await, 1);
    }

    #[tokio::test]
    async fn update_touches_and_rejects_unsaved() {
        let (_database, mut em) = manager();
        let mut comment = Comment::new(1, 1, "draft");
        let err = em
            .update(&mut comment, Commit::Now)
            .await
            .expect_err("unsaved entity");
        assert!(matches!(err, RepoError::InvalidInput { .. }));

        em.insert(&mut comment, Commit::Now).await.expect("insert");
        assert!(comment.updated_date.is_none());
        comment.content = "edited".to_string();
        em.update(&mut comment, Commit::Now).await.expect("update");
        assert!(comment.updated_date.is_some());

        let stored = em
            .select::<Comment>(comment.id.expect("id"))
            .await
            .expect("select")
            .expect("present");
        assert_eq!(stored.content, "edited");
    }

    #[tokio::test]
    async fn stamps_carry_no_sub_microsecond_digits() {
        let (_database, mut em) = manager();
        let mut comment = Comment::new(1, 1, "precise");
        em.insert(&mut comment, Commit::Now).await.expect("insert");
        em.update(&mut comment, Commit::Now).await.expect("update");

        assert_eq!(comment.created_date.nanosecond() % 1_000, 0);
        let updated = comment.updated_date.expect("stamped");
        assert_eq!(updated.nanosecond() % 1_000, 0);
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let (_database, mut em) = manager();
        let mut comment = Comment::new(1, 1, "ghost");
        comment.id = Some(99);
        let err = em
            .update(&mut comment, Commit::Now)
            .await
            .expect_err("missing row");
        assert!(matches!(err, RepoError::NotFound));
    }

    #[tokio::test]
    async fn sum_of_no_rows_is_zero() {
        let (_database, mut em) = manager();
        let query = Query::<Revision>::all().filter(Revision::DOCUMENT_ID.eq(7_i64));
        assert_eq!(
            em.sum_all(Revision::FILESIZE, query.clone())
                .await
                .expect("sum"),
            0
        );
        assert_eq!(em.count_all(query).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn rollback_discards_staged_writes() {
        let (database, mut em) = manager();
        let mut comment = Comment::new(1, 1, "temporary");
        em.insert(&mut comment, Commit::Deferred)
            .await
            .expect("insert");
        em.rollback().await.expect("rollback");

        assert_eq!(database.committed_len("comments").await, 0);
        assert!(!em.in_transaction());
        assert_eq!(
            em.select::<Comment>(comment.id.expect("id"))
                .await
                .expect("select"),
            None
        );
    }

    #[tokio::test]
    async fn exists_probes_with_filters() {
        let (_database, mut em) = manager();
        let mut comment = Comment::new(4, 2, "hello");
        em.insert(&mut comment, Commit::Now).await.expect("insert");

        let hit = Query::<Comment>::all().filter(Comment::USER_ID.eq(4_i64));
        let miss = Query::<Comment>::all().filter(Comment::USER_ID.eq(5_i64));
        assert!(em.exists(hit).await.expect("exists"));
        assert!(!em.exists(miss).await.expect("exists"));
    }
}
