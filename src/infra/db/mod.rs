//! Durable store implementations.

mod memory;
mod query;
mod util;

pub use memory::MemoryDatabase;
pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    PgConnection, Postgres, QueryBuilder, Row as _,
    postgres::{PgPool, PgPoolOptions, PgRow},
    query as raw_query,
};
use time::OffsetDateTime;
use tracing::trace;

use crate::application::filter::QuerySpec;
use crate::application::repos::{Database, RepoError, Transaction};
use crate::config::DatabaseSettings;
use crate::domain::schema::{ColumnDef, ColumnType, ID_COLUMN, Row, Value};
use crate::infra::error::InfraError;

use query::{push_filters, push_ident, push_paging, push_value};

/// Database URL selecting the in-process [`MemoryDatabase`].
pub const MEMORY_URL: &str = "memory://";

/// Open the durable store named by `settings.url`.
pub async fn connect(settings: &DatabaseSettings) -> Result<Arc<dyn Database>, InfraError> {
    if settings.url == MEMORY_URL {
        return Ok(Arc::new(MemoryDatabase::new()));
    }
    if !(settings.url.starts_with("postgres://") || settings.url.starts_with("postgresql://")) {
        return Err(InfraError::configuration(format!(
            "database.url must be `{MEMORY_URL}` or a postgres URL"
        )));
    }

    let pool = PostgresDatabase::connect(&settings.url, settings.max_connections.get())
        .await
        .map_err(|err| InfraError::connect(&settings.url, err))?;
    Ok(Arc::new(PostgresDatabase::new(pool)))
}

#[derive(Clone)]
pub struct PostgresDatabase {
    pool: Arc<PgPool>,
}

impl PostgresDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepoError> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Box::new(PgTransaction { tx: Some(tx) }))
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        raw_query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

/// A Postgres transaction; statements run eagerly, so `flush` has nothing to do.
pub struct PgTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PgTransaction {
    fn conn(&mut self) -> Result<&mut PgConnection, RepoError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| RepoError::from_persistence("transaction already closed"))
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}

fn decode_row(row: &PgRow, columns: &[ColumnDef]) -> Result<Row, RepoError> {
    let mut decoded = Row::new();
    for column in columns {
        let value = match column.ty {
            ColumnType::Int => row.try_get::<Option<i64>, _>(column.name).map(Value::from),
            ColumnType::Float => row.try_get::<Option<f64>, _>(column.name).map(Value::from),
            ColumnType::Text => row
                .try_get::<Option<String>, _>(column.name)
                .map(Value::from),
            ColumnType::Bool => row.try_get::<Option<bool>, _>(column.name).map(Value::from),
            ColumnType::Timestamp => row
                .try_get::<Option<OffsetDateTime>, _>(column.name)
                .map(Value::from),
        }
        .map_err(map_sqlx_error)?;
        decoded.set(column.name, value);
    }
    Ok(decoded)
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn insert(&mut self, table: &'static str, row: Row) -> Result<i64, RepoError> {
        let values: Vec<(&str, &Value)> = row
            .iter()
            .filter(|(name, _)| *name != ID_COLUMN.name)
            .collect();

        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO ");
        push_ident(&mut qb, table);
        if values.is_empty() {
            qb.push(" DEFAULT VALUES");
        } else {
            qb.push(" (");
            for (index, (name, _)) in values.iter().enumerate() {
                if index > 0 {
                    qb.push(", ");
                }
                push_ident(&mut qb, name);
            }
            qb.push(") VALUES (");
            for (index, (_, value)) in values.iter().enumerate() {
                if index > 0 {
                    qb.push(", ");
                }
                push_value(&mut qb, value);
            }
            qb.push(")");
        }
        qb.push(" RETURNING ");
        push_ident(&mut qb, ID_COLUMN.name);

        trace!(table, sql = qb.sql(), "insert");
        let conn = self.conn()?;
        let inserted = qb
            .build()
            .fetch_one(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        inserted
            .try_get::<i64, _>(ID_COLUMN.name)
            .map_err(map_sqlx_error)
    }

    async fn update(&mut self, table: &'static str, id: i64, row: Row) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        push_ident(&mut qb, table);
        qb.push(" SET ");
        let mut assigned = 0;
        for (name, value) in row.iter().filter(|(name, _)| *name != ID_COLUMN.name) {
            if assigned > 0 {
                qb.push(", ");
            }
            push_ident(&mut qb, name);
            qb.push(" = ");
            push_value(&mut qb, value);
            assigned += 1;
        }
        if assigned == 0 {
            push_ident(&mut qb, ID_COLUMN.name);
            qb.push(" = ");
            push_ident(&mut qb, ID_COLUMN.name);
        }
        qb.push(" WHERE ");
        push_ident(&mut qb, ID_COLUMN.name);
        qb.push(" = ");
        qb.push_bind(id);

        trace!(table, id, sql = qb.sql(), "update");
        let conn = self.conn()?;
        let result = qb
            .build()
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&mut self, table: &'static str, id: i64) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        push_ident(&mut qb, table);
        qb.push(" WHERE ");
        push_ident(&mut qb, ID_COLUMN.name);
        qb.push(" = ");
        qb.push_bind(id);

        trace!(table, id, "delete");
        let conn = self.conn()?;
        let result = qb
            .build()
            .execute(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn select(
        &mut self,
        table: &'static str,
        columns: &[ColumnDef],
        spec: &QuerySpec,
    ) -> Result<Vec<Row>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        for (index, column) in columns.iter().enumerate() {
            if index > 0 {
                qb.push(", ");
            }
            push_ident(&mut qb, column.name);
        }
        qb.push(" FROM ");
        push_ident(&mut qb, table);
        push_filters(&mut qb, spec);
        push_paging(&mut qb, spec);

        trace!(table, sql = qb.sql(), "select");
        let conn = self.conn()?;
        let rows = qb
            .build()
            .fetch_all(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(|row| decode_row(row, columns)).collect()
    }

    async fn count(&mut self, table: &'static str, spec: &QuerySpec) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM ");
        push_ident(&mut qb, table);
        push_filters(&mut qb, spec);

        let conn = self.conn()?;
        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&mut *conn)
            .await
            .map_err(map_sqlx_error)?;
        Self::convert_count(count)
    }

    async fn sum(
        &mut self,
        table: &'static str,
        column: ColumnDef,
        spec: &QuerySpec,
    ) -> Result<i64, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COALESCE(SUM(");
        push_ident(&mut qb, column.name);
        qb.push("), 0)::BIGINT FROM ");
        push_ident(&mut qb, table);
        push_filters(&mut qb, spec);

        let conn = self.conn()?;
        qb.build_query_scalar()
            .fetch_one(&mut *conn)
            .await
            .map_err(map_sqlx_error)
    }

    async fn lock_table(&mut self, table: &'static str) -> Result<(), RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("LOCK TABLE ");
        push_ident(&mut qb, table);
        qb.push(" IN EXCLUSIVE MODE");

        let conn = self.conn()?;
        qb.build()
            .execute(&mut *conn)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn flush(&mut self) -> Result<(), RepoError> {
        self.conn().map(|_| ())
    }

    async fn commit(&mut self) -> Result<(), RepoError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| RepoError::from_persistence("transaction already closed"))?;
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(&mut self) -> Result<(), RepoError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| RepoError::from_persistence("transaction already closed"))?;
        tx.rollback().await.map_err(map_sqlx_error)
    }
}
