//! Store - the remote column-store surface this crate is built on.
//!
//! A store holds namespaces of collections of rows. Each row is an ordered
//! set of `(name, value, timestamp)` columns, optionally grouped under named
//! sub-collections. Writes never update in place: a write replaces the whole
//! column, and the later timestamp wins.
//!
//! ## Example
//!
//! ```ignore
//! use rowkeeper::{ColumnParent, ConsistencyLevel, InMemoryStore, SlicePredicate, Store};
//!
//! let store = InMemoryStore::new();
//! let columns = store.get_slice(
//!     "blog",
//!     "post-1",
//!     &ColumnParent::new("posts"),
//!     &SlicePredicate::full(),
//!     ConsistencyLevel::One,
//! )?;
//! ```

mod in_memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use in_memory::{InMemoryStore, StoreOp};

/// Per-call durability/visibility tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    Zero,
    #[default]
    One,
    Quorum,
    DcQuorum,
    DcQuorumSync,
    All,
    Any,
}

/// A single `(name, value, timestamp)` cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub value: String,
    pub timestamp: i64,
}

impl Column {
    pub fn new(name: impl Into<String>, value: impl Into<String>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp,
        }
    }
}

/// The container a slice, count or multiget reads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnParent {
    pub collection: String,
    pub sub_collection: Option<String>,
}

impl ColumnParent {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            sub_collection: None,
        }
    }

    pub fn nested(collection: impl Into<String>, sub_collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            sub_collection: Some(sub_collection.into()),
        }
    }
}

/// The target of a remove or a single-column write.
///
/// With no `sub_collection` and no `column` the path addresses the whole row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnPath {
    pub collection: String,
    pub sub_collection: Option<String>,
    pub column: Option<String>,
}

/// A bounded range over column names.
///
/// Empty `start`/`finish` mean unbounded. Both bounds are inclusive. When
/// `reversed` is set the range walks downwards from `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRange {
    pub start: String,
    pub finish: String,
    pub reversed: bool,
    pub count: usize,
}

/// Selects columns either by explicit name or by range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlicePredicate {
    Names(Vec<String>),
    Range(SliceRange),
}

impl SlicePredicate {
    /// The whole row, in ascending name order.
    pub fn full() -> Self {
        SlicePredicate::Range(SliceRange {
            start: String::new(),
            finish: String::new(),
            reversed: false,
            count: usize::MAX,
        })
    }

    pub fn range(
        start: impl Into<String>,
        finish: impl Into<String>,
        reversed: bool,
        count: usize,
    ) -> Self {
        SlicePredicate::Range(SliceRange {
            start: start.into(),
            finish: finish.into(),
            reversed,
            count,
        })
    }
}

/// One entry of a `batch_insert` against a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Column(Column),
    SubCollection { name: String, columns: Vec<Column> },
}

/// The remote operations this crate depends on.
pub trait Store: Send + Sync {
    /// Read a slice of one row.
    fn get_slice(
        &self,
        namespace: &str,
        row_id: &str,
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<Column>, StoreError>;

    /// Read the same slice of many rows. Rows with no matching columns map to
    /// an empty list.
    fn multiget_slice(
        &self,
        namespace: &str,
        row_ids: &[String],
        parent: &ColumnParent,
        predicate: &SlicePredicate,
        consistency: ConsistencyLevel,
    ) -> Result<BTreeMap<String, Vec<Column>>, StoreError>;

    /// Write columns into one row, keyed by collection name.
    fn batch_insert(
        &self,
        namespace: &str,
        row_id: &str,
        mutations: BTreeMap<String, Vec<Mutation>>,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError>;

    /// Write a single column. `path.column` must be set.
    fn insert(
        &self,
        namespace: &str,
        row_id: &str,
        path: &ColumnPath,
        value: &str,
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError>;

    /// Delete everything under `path` written at or before `timestamp`.
    fn remove(
        &self,
        namespace: &str,
        row_id: &str,
        path: &ColumnPath,
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError>;

    /// Number of columns under `parent` in one row.
    fn get_count(
        &self,
        namespace: &str,
        row_id: &str,
        parent: &ColumnParent,
        consistency: ConsistencyLevel,
    ) -> Result<usize, StoreError>;

    /// Row ids in `[start, finish]`, in row-id order, at most `count`.
    fn get_key_range(
        &self,
        namespace: &str,
        collection: &str,
        start: &str,
        finish: &str,
        count: usize,
        consistency: ConsistencyLevel,
    ) -> Result<Vec<String>, StoreError>;
}

/// Seconds since the epoch, UTC. Every write in this crate is stamped with it.
pub fn timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
