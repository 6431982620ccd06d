//! Durable store traits and the persistence error taxonomy.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::filter::{FilterError, QuerySpec};
use crate::cache::CacheError;
use crate::domain::error::DomainError;
use crate::domain::schema::{ColumnDef, Row};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error(transparent)]
    Decode(#[from] DomainError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("cache invalidation failed: {0}")]
    Cache(#[from] CacheError),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Handle to a transactional durable store.
#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepoError>;

    /// Cheap liveness probe.
    async fn health_check(&self) -> Result<(), RepoError>;
}

/// One open transaction.
///
/// Table and column names come from static entity schemas only. Writes are
/// visible to later reads on the same transaction as soon as the call
/// returns, so generated ids are available without a separate flush.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Insert `row` (its `id` column ignored) and return the generated id.
    async fn insert(&mut self, table: &'static str, row: Row) -> Result<i64, RepoError>;

    /// Overwrite the row with `id`; `false` when no such row exists.
    async fn update(&mut self, table: &'static str, id: i64, row: Row) -> Result<bool, RepoError>;

    /// Remove the row with `id`; `false` when no such row exists.
    async fn delete(&mut self, table: &'static str, id: i64) -> Result<bool, RepoError>;

    async fn select(
        &mut self,
        table: &'static str,
        columns: &[ColumnDef],
        spec: &QuerySpec,
    ) -> Result<Vec<Row>, RepoError>;

    async fn count(&mut self, table: &'static str, spec: &QuerySpec) -> Result<u64, RepoError>;

    /// `SUM(column)` over matching rows, 0 when none match.
    async fn sum(
        &mut self,
        table: &'static str,
        column: ColumnDef,
        spec: &QuerySpec,
    ) -> Result<i64, RepoError>;

    /// Exclusive table lock held until the transaction ends.
    async fn lock_table(&mut self, table: &'static str) -> Result<(), RepoError>;

    async fn flush(&mut self) -> Result<(), RepoError>;

    /// End the transaction durably. Further calls fail.
    async fn commit(&mut self) -> Result<(), RepoError>;

    /// Discard every staged write. Further calls fail.
    async fn rollback(&mut self) -> Result<(), RepoError>;
}
