//! In-process durable store for tests and embedded use.
//!
//! Committed rows live behind one `RwLock`. Every transaction stages its
//! writes in a private overlay that is applied atomically on commit, so
//! other transactions only ever observe committed state while the owner
//! reads its own writes. Ids come from a shared per-table sequence and are
//! never reused, even after a rollback.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::trace;

use crate::application::filter::{Direction, QuerySpec};
use crate::application::repos::{Database, RepoError, Transaction};
use crate::domain::schema::{ColumnDef, ID_COLUMN, Row, Value};

type TableRows = BTreeMap<i64, Row>;

#[derive(Default)]
struct Tables {
    rows: HashMap<&'static str, TableRows>,
    sequences: HashMap<&'static str, i64>,
}

#[derive(Default)]
struct Shared {
    tables: RwLock<Tables>,
    locks: Mutex<HashMap<&'static str, Arc<Mutex<()>>>>,
}

/// Durable store kept entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed row count of `table`.
    pub async fn committed_len(&self, table: &str) -> usize {
        self.shared
            .tables
            .read()
            .await
            .rows
            .get(table)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn Transaction>, RepoError> {
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            staged: HashMap::new(),
            held: HashMap::new(),
            open: true,
        }))
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// Transaction over a [`MemoryDatabase`]. Dropping it uncommitted discards
/// the overlay and releases its table locks.
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    /// Staged writes per table; `None` marks a deleted row.
    staged: HashMap<&'static str, BTreeMap<i64, Option<Row>>>,
    held: HashMap<&'static str, OwnedMutexGuard<()>>,
    open: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> Result<(), RepoError> {
        if self.open {
            Ok(())
        } else {
            Err(RepoError::from_persistence("transaction already closed"))
        }
    }

    /// Rows of `table` as this transaction sees them.
    async fn visible(&self, table: &str) -> TableRows {
        let mut rows = self
            .shared
            .tables
            .read()
            .await
            .rows
            .get(table)
            .cloned()
            .unwrap_or_default();

        if let Some(staged) = self.staged.get(table) {
            for (id, row) in staged {
                match row {
                    Some(row) => rows.insert(*id, row.clone()),
                    None => rows.remove(id),
                };
            }
        }
        rows
    }

    async fn exists(&self, table: &str, id: i64) -> bool {
        if let Some(staged) = self.staged.get(table).and_then(|rows| rows.get(&id)) {
            return staged.is_some();
        }
        self.shared
            .tables
            .read()
            .await
            .rows
            .get(table)
            .is_some_and(|rows| rows.contains_key(&id))
    }

    /// Rows matching the predicates and subquery of `spec`, in id order.
    async fn matching(&self, table: &str, spec: &QuerySpec) -> Vec<Row> {
        let allowed = match &spec.subquery {
            Some(subquery) => Some(
                self.visible(subquery.table)
                    .await
                    .into_values()
                    .filter(|row| subquery.matches(row))
                    .filter_map(|row| row.get(subquery.column.name).as_i64())
                    .collect::<HashSet<_>>(),
            ),
            None => None,
        };

        self.visible(table)
            .await
            .into_iter()
            .filter(|(id, _)| allowed.as_ref().is_none_or(|ids| ids.contains(id)))
            .map(|(_, row)| row)
            .filter(|row| spec.matches(row))
            .collect()
    }

    fn stage(&mut self, table: &'static str, id: i64, row: Option<Row>) {
        self.staged.entry(table).or_default().insert(id, row);
    }
}

/// Postgres ordering: `NULL` sorts last ascending and first descending.
fn compare_nullable(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => left.compare(right).unwrap_or(Ordering::Equal),
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn insert(&mut self, table: &'static str, mut row: Row) -> Result<i64, RepoError> {
        self.ensure_open()?;
        let id = {
            let mut tables = self.shared.tables.write().await;
            let sequence = tables.sequences.entry(table).or_insert(0);
            *sequence += 1;
            *sequence
        };
        row.set(ID_COLUMN.name, id);
        self.stage(table, id, Some(row));
        trace!(table, id, "staged insert");
        Ok(id)
    }

    async fn update(&mut self, table: &'static str, id: i64, mut row: Row) -> Result<bool, RepoError> {
        self.ensure_open()?;
        if !self.exists(table, id).await {
            return Ok(false);
        }
        row.set(ID_COLUMN.name, id);
        self.stage(table, id, Some(row));
        Ok(true)
    }

    async fn delete(&mut self, table: &'static str, id: i64) -> Result<bool, RepoError> {
        self.ensure_open()?;
        if !self.exists(table, id).await {
            return Ok(false);
        }
        self.stage(table, id, None);
        Ok(true)
    }

    async fn select(
        &mut self,
        table: &'static str,
        columns: &[ColumnDef],
        spec: &QuerySpec,
    ) -> Result<Vec<Row>, RepoError> {
        self.ensure_open()?;
        let mut rows = self.matching(table, spec).await;

        if let Some(order) = spec.order {
            rows.sort_by(|left, right| {
                let ordering =
                    compare_nullable(left.get(order.column.name), right.get(order.column.name));
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        let offset = usize::try_from(spec.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = spec
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| row.project(columns))
            .collect())
    }

    async fn count(&mut self, table: &'static str, spec: &QuerySpec) -> Result<u64, RepoError> {
        self.ensure_open()?;
        let count = self.matching(table, spec).await.len();
        u64::try_from(count).map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }

    async fn sum(
        &mut self,
        table: &'static str,
        column: ColumnDef,
        spec: &QuerySpec,
    ) -> Result<i64, RepoError> {
        self.ensure_open()?;
        self.matching(table, spec)
            .await
            .iter()
            .filter_map(|row| row.get(column.name).as_i64())
            .try_fold(0_i64, i64::checked_add)
            .ok_or_else(|| RepoError::from_persistence("sum exceeds supported range"))
    }

    async fn lock_table(&mut self, table: &'static str) -> Result<(), RepoError> {
        self.ensure_open()?;
        if self.held.contains_key(table) {
            return Ok(());
        }
        let mutex = {
            let mut locks = self.shared.locks.lock().await;
            Arc::clone(locks.entry(table).or_default())
        };
        let guard = mutex.lock_owned().await;
        self.held.insert(table, guard);
        trace!(table, "table lock acquired");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), RepoError> {
        self.ensure_open()
    }

    async fn commit(&mut self) -> Result<(), RepoError> {
        self.ensure_open()?;
        {
            let mut tables = self.shared.tables.write().await;
            for (table, writes) in self.staged.drain() {
                let rows = tables.rows.entry(table).or_default();
                for (id, row) in writes {
                    match row {
                        Some(row) => rows.insert(id, row),
                        None => rows.remove(&id),
                    };
                }
            }
        }
        self.held.clear();
        self.open = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), RepoError> {
        self.ensure_open()?;
        self.staged.clear();
        self.held.clear();
        self.open = false;
        Ok(())
    }
}
