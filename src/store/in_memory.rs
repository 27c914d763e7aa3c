//! InMemoryStore - BTreeMap-backed column store for testing and development.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, RwLock};

use super::{
    Column, ColumnParent, ColumnPath, ConsistencyLevel, Mutation, SlicePredicate, Store,
};
use crate::error::StoreError;

type Columns = BTreeMap<String, Column>;

/// Storage address of a row: `(namespace, collection, row_id)`.
type RowAddr = (String, String, String);

/// Internal stored representation of a row.
#[derive(Default)]
struct StoredRow {
    columns: Columns,
    nested: BTreeMap<String, Columns>,
}

impl StoredRow {
    fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.nested.is_empty()
    }

    fn columns(&self, sub_collection: Option<&str>) -> Option<&Columns> {
        match sub_collection {
            Some(name) => self.nested.get(name),
            None => Some(&self.columns),
        }
    }
}

/// Operations counted by `InMemoryStore::op_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetSlice,
    MultigetSlice,
    BatchInsert,
    Insert,
    Remove,
    GetCount,
    GetKeyRange,
}

/// In-memory column store.
///
/// Writes are last-write-wins on timestamp; a remove deletes columns stamped
/// at or before the removal. Clone-friendly via Arc: clones share storage and
/// operation counters.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    rows: Arc<RwLock<BTreeMap<RowAddr, StoredRow>>>,
    ops: Arc<Mutex<HashMap<StoreOp, usize>>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `op` has been called.
    pub fn op_count(&self, op: StoreOp) -> usize {
        self.ops
            .lock()
            .map(|ops| ops.get(&op).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Total number of write calls (`batch_insert`, `insert`, `remove`).
    pub fn write_count(&self) -> usize {
        self.op_count(StoreOp::BatchInsert)
            + self.op_count(StoreOp::Insert)
            + self.op_count(StoreOp::Remove)
    }

    /// Reset all operation counters to zero.
    pub fn reset_counts(&self) {
        if let Ok(mut ops) = self.ops.lock() {
            ops.clear();
        }
    }

    fn record(&self, op: StoreOp) -> Result<(), StoreError> {
        let mut ops = self
            .ops
            .lock()
            .map_err(|_| StoreError::LockPoisoned("op counter"))?;
        *ops.entry(op).or_insert(0) += 1;
        Ok(())
    }

    fn addr(namespace: &str, collection: &str, row_id: &str) -> RowAddr {
        (
            namespace.to_string(),
            collection.to_string(),
            row_id.to_string(),
        )
    }
}

fn write_column(columns: &mut Columns, column: Column) {
    match columns.get(&column.name) {
        Some(existing) if existing.timestamp > column.timestamp => {}
        _ => {
            columns.insert(column.name.clone(), column);
        }
    }
}

fn remove_older(columns: &mut Columns, timestamp: i64) {
    columns.retain(|_, column| column.timestamp > timestamp);
}

fn select(columns: &Columns, predicate: &SlicePredicate) -> Vec<Column> {
    match predicate {
        SlicePredicate::Names(names) => names
            .iter()
            .filter_map(|name| columns.get(name).cloned())
            .collect(),
        SlicePredicate::Range(range) if !range.reversed => {
            let lower = if range.start.is_empty() {
                Bound::Unbounded
            } else {
                Bound::Included(range.start.as_str())
            };
            columns
                .range::<str, _>((lower, Bound::Unbounded))
                .take_while(|(name, _)| range.finish.is_empty() || name.as_str() <= range.finish.as_str())
                .take(range.count)
                .map(|(_, column)| column.clone())
                .collect()
        }
        SlicePredicate::Range(range) => {
            let upper = if range.start.is_empty() {
                Bound::Unbounded
            } else {
                Bound::Included(range.start.as_str())
            };
            columns
                .range::<str, _>((Bound::Unbounded, upper))
                .rev()
                .take_while(|(name, _)| range.finish.is_empty() || name.as_str() >= range.finish.as_str())
                .take(range.count)
                .map(|(_, column)| column.clone())
                .collect()
        }
    }
}

impl Store for InMemoryStore {
    fn get_slice(
        &self,
        namespace: &str,
        row_id: &str,
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        _consistency: ConsistencyLevel,
    ) -> Result<Vec<Column>, StoreError> {
        self.record(StoreOp::GetSlice)?;
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;

        let addr = Self::addr(namespace, &parent.collection, row_id);
        Ok(rows
            .get(&addr)
            .and_then(|row| row.columns(parent.sub_collection.as_deref()))
            .map(|columns| select(columns, predicate))
            .unwrap_or_default())
    }

    fn multiget_slice(
        &self,
        namespace: &str,
        row_ids: &[String],
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        _consistency: ConsistencyLevel,
    ) -> Result<BTreeMap<String, Vec<Column>>, StoreError> {
        self.record(StoreOp::MultigetSlice)?;
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;

        let mut result = BTreeMap::new();
        for row_id in row_ids {
            let addr = Self::addr(namespace, &parent.collection, row_id);
            let columns = rows
                .get(&addr)
                .and_then(|row| row.columns(parent.sub_collection.as_deref()))
                .map(|columns| select(columns, predicate))
                .unwrap_or_default();
            result.insert(row_id.clone(), columns);
        }
        Ok(result)
    }

    fn batch_insert(
        &self,
        namespace: &str,
        row_id: &str,
        mutations: BTreeMap<String, Vec<Mutation>>,
        _consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.record(StoreOp::BatchInsert)?;
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;

        for (collection, entries) in mutations {
            let row = rows
                .entry(Self::addr(namespace, &collection, row_id))
                .or_default();
            for entry in entries {
                match entry {
                    Mutation::Column(column) => write_column(&mut row.columns, column),
                    Mutation::SubCollection { name, columns } => {
                        let nested = row.nested.entry(name).or_default();
                        for column in columns {
                            write_column(nested, column);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn insert(
        &self,
        namespace: &str,
        row_id: &str,
        path: &ColumnPath,
        value: &str,
        timestamp: i64,
        _consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.record(StoreOp::Insert)?;
        let name = path
            .column
            .clone()
            .ok_or_else(|| StoreError::Transport("insert requires a column name".into()))?;

        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;
        let row = rows
            .entry(Self::addr(namespace, &path.collection, row_id))
            .or_default();
        let columns = match &path.sub_collection {
            Some(sub) => row.nested.entry(sub.clone()).or_default(),
            None => &mut row.columns,
        };
        write_column(columns, Column::new(name, value, timestamp));
        Ok(())
    }

    fn remove(
        &self,
        namespace: &str,
        row_id: &str,
        path: &ColumnPath,
        timestamp: i64,
        _consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.record(StoreOp::Remove)?;
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StoreError::LockPoisoned("write"))?;

        let addr = Self::addr(namespace, &path.collection, row_id);
        let Some(row) = rows.get_mut(&addr) else {
            return Ok(());
        };

        match (&path.sub_collection, &path.column) {
            (Some(sub), Some(column)) => {
                if let Some(nested) = row.nested.get_mut(sub) {
                    if nested.get(column).is_some_and(|c| c.timestamp <= timestamp) {
                        nested.remove(column);
                    }
                }
            }
            (Some(sub), None) => {
                if let Some(nested) = row.nested.get_mut(sub) {
                    remove_older(nested, timestamp);
                }
            }
            (None, Some(column)) => {
                if row.columns.get(column).is_some_and(|c| c.timestamp <= timestamp) {
                    row.columns.remove(column);
                }
            }
            (None, None) => {
                remove_older(&mut row.columns, timestamp);
                for nested in row.nested.values_mut() {
                    remove_older(nested, timestamp);
                }
            }
        }

        row.nested.retain(|_, nested| !nested.is_empty());
        if row.is_empty() {
            rows.remove(&addr);
        }
        Ok(())
    }

    fn get_count(
        &self,
        namespace: &str,
        row_id: &str,
        parent: &ColumnParent,
        _consistency: ConsistencyLevel,
    ) -> Result<usize, StoreError> {
        self.record(StoreOp::GetCount)?;
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;

        let addr = Self::addr(namespace, &parent.collection, row_id);
        Ok(rows
            .get(&addr)
            .and_then(|row| row.columns(parent.sub_collection.as_deref()))
            .map(|columns| columns.len())
            .unwrap_or(0))
    }

    fn get_key_range(
        &self,
        namespace: &str,
        collection: &str,
        start: &str,
        finish: &str,
        count: usize,
        _consistency: ConsistencyLevel,
    ) -> Result<Vec<String>, StoreError> {
        self.record(StoreOp::GetKeyRange)?;
        let rows = self
            .rows
            .read()
            .map_err(|_| StoreError::LockPoisoned("read"))?;

        Ok(rows
            .iter()
            .filter(|((ns, cf, _), row)| ns == namespace && cf == collection && !row.is_empty())
            .map(|((_, _, row_id), _)| row_id)
            .filter(|row_id| start.is_empty() || row_id.as_str() >= start)
            .take_while(|row_id| finish.is_empty() || row_id.as_str() <= finish)
            .take(count)
            .cloned()
            .collect())
    }
}
