//! View - a paginated list of pointers to records.
//!
//! A view is one row whose columns point at records: each column's value is
//! a record row id, and column order is view order. Records are reached by
//! stamping that row id onto the view's record key.
//!
//! ## Example
//!
//! ```ignore
//! use rowkeeper::{Key, View};
//!
//! let view = View::new(
//!     Key::with_row_id("blog", "user_posts", "ada")?,
//!     Key::with_row_id("blog", "posts", "template")?,
//! );
//! view.append(&pool, &post)?;
//!
//! for post in view.records(&pool) {
//!     let post = post?;
//! }
//! ```

mod cursor;
mod partitioned;

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::config::{self, Config};
use crate::connection::Pool;
use crate::error::StoreError;
use crate::key::Key;
use crate::record::{Plain, Record, Schema, SecondaryIndex};
use crate::record_set;
use crate::store::{self, ConsistencyLevel, Store};

pub use cursor::KeyCursor;
pub use partitioned::{DailyPartitions, PartitionRecords, PartitionedView, Partitioner};

/// How `View::records` materializes records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// One load per key; a failed load is yielded as an error.
    #[default]
    Strict,
    /// One load per key; keys whose load fails are skipped.
    FaultTolerant,
    /// All keys first, then one bulk load. Missing rows are skipped.
    Batch,
}

/// A row of pointer columns.
#[derive(Clone)]
pub struct View {
    key: Key,
    record_key: Key,
    schema: Arc<dyn Schema>,
    chunk_size: usize,
    reversed: bool,
    mode: LoadMode,
    consistency: Option<ConsistencyLevel>,
}

impl View {
    /// A strict view stored at `key` pointing at rows addressed like
    /// `record_key`.
    pub fn new(key: Key, record_key: Key) -> Self {
        View {
            key,
            record_key,
            schema: Arc::new(Plain),
            chunk_size: config::default_chunk_size(),
            reversed: false,
            mode: LoadMode::Strict,
            consistency: None,
        }
    }

    /// A view that skips pointers whose record cannot be loaded.
    pub fn fault_tolerant(key: Key, record_key: Key) -> Self {
        Self::new(key, record_key).with_mode(LoadMode::FaultTolerant)
    }

    /// A view that loads records in bulk, with large pages.
    pub fn batch(key: Key, record_key: Key) -> Self {
        Self::new(key, record_key)
            .with_mode(LoadMode::Batch)
            .with_chunk_size(config::default_batch_chunk_size())
    }

    pub fn with_schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Walk columns in descending name order.
    pub fn reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyLevel) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// Take page size and consistency from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.chunk_size = match self.mode {
            LoadMode::Batch => config.batch_chunk_size,
            _ => config.chunk_size,
        };
        self.consistency = Some(config.consistency);
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn record_key(&self) -> &Key {
        &self.record_key
    }

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// The same view stored in another row.
    pub fn at_row(&self, row_id: impl Into<String>) -> View {
        View {
            key: self.key.for_row(row_id),
            ..self.clone()
        }
    }

    fn consistency(&self, pool: &Pool) -> ConsistencyLevel {
        self.consistency.unwrap_or_else(|| pool.consistency())
    }

    /// Record keys in view order, from column `start` to column `finish`
    /// (empty for unbounded).
    pub fn keys<'a>(&self, pool: &'a Pool, start: &str, finish: &str) -> KeyCursor<'a> {
        KeyCursor::new(
            pool,
            self.key.clone(),
            self.record_key.clone(),
            start.to_string(),
            finish.to_string(),
            self.chunk_size,
            self.reversed,
            self.consistency(pool),
        )
    }

    /// Records in view order, loaded according to the view's `LoadMode`.
    pub fn records<'a>(&self, pool: &'a Pool) -> Records<'a> {
        let consistency = self.consistency(pool);
        let keys = self.keys(pool, "", "");

        let state = match self.mode {
            LoadMode::Strict | LoadMode::FaultTolerant => RecordsState::Lazy {
                keys,
                skip_failures: self.mode == LoadMode::FaultTolerant,
            },
            LoadMode::Batch => {
                let loaded = keys
                    .collect::<Result<Vec<Key>, StoreError>>()
                    .and_then(|keys| {
                        record_set::multiget(pool, &keys, self.schema.clone(), consistency)
                    });
                match loaded {
                    Ok(records) => RecordsState::Loaded(records.into_iter()),
                    Err(err) => RecordsState::Failed(Some(err)),
                }
            }
        };

        Records {
            pool,
            schema: self.schema.clone(),
            consistency,
            state,
        }
    }

    /// Add a pointer to `record`, named and valued by its row id.
    pub fn append(&self, pool: &Pool, record: &Record) -> Result<(), StoreError> {
        let row_id = record.key().ok_or(StoreError::MissingKey)?.row_id();
        self.write_pointer(pool, row_id, row_id)
    }

    /// Add a pointer to `row_id` under a fresh time-ordered column name,
    /// so the same row can appear many times. Returns the column name.
    pub fn append_anonymous(&self, pool: &Pool, row_id: &str) -> Result<String, StoreError> {
        let column = Uuid::now_v7().to_string();
        self.write_pointer(pool, &column, row_id)?;
        Ok(column)
    }

    fn write_pointer(&self, pool: &Pool, column: &str, row_id: &str) -> Result<(), StoreError> {
        let client = pool.acquire(self.key.namespace())?;
        client.insert(
            self.key.namespace(),
            self.key.row_id(),
            &self.key.column_path(column),
            row_id,
            store::timestamp(),
            self.consistency(pool),
        )
    }

    /// Delete the pointer to `record`.
    pub fn remove(&self, pool: &Pool, record: &Record) -> Result<(), StoreError> {
        let row_id = record.key().ok_or(StoreError::MissingKey)?.row_id();
        let client = pool.acquire(self.key.namespace())?;
        client.remove(
            self.key.namespace(),
            self.key.row_id(),
            &self.key.column_path(row_id),
            store::timestamp(),
            self.consistency(pool),
        )
    }

    /// Number of pointers, counted by the server.
    pub fn count(&self, pool: &Pool) -> Result<usize, StoreError> {
        let client = pool.acquire(self.key.namespace())?;
        client.get_count(
            self.key.namespace(),
            self.key.row_id(),
            &self.key.parent(),
            self.consistency(pool),
        )
    }
}

impl SecondaryIndex for View {
    fn append(&self, pool: &Pool, record: &Record) -> Result<(), StoreError> {
        View::append(self, pool, record)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("key", &self.key)
            .field("record_key", &self.record_key)
            .field("chunk_size", &self.chunk_size)
            .field("reversed", &self.reversed)
            .field("mode", &self.mode)
            .finish()
    }
}

enum RecordsState<'a> {
    Lazy {
        keys: KeyCursor<'a>,
        skip_failures: bool,
    },
    Loaded(std::vec::IntoIter<Record>),
    Failed(Option<StoreError>),
}

/// Iterator returned by `View::records`.
pub struct Records<'a> {
    pool: &'a Pool,
    schema: Arc<dyn Schema>,
    consistency: ConsistencyLevel,
    state: RecordsState<'a>,
}

impl Iterator for Records<'_> {
    type Item = Result<Record, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            RecordsState::Loaded(records) => records.next().map(Ok),
            RecordsState::Failed(err) => err.take().map(Err),
            RecordsState::Lazy {
                keys,
                skip_failures,
            } => loop {
                let key = match keys.next()? {
                    Ok(key) => key,
                    Err(err) => return Some(Err(err)),
                };
                match Record::fetch(self.pool, self.schema.clone(), &key, self.consistency) {
                    Ok(record) => return Some(Ok(record)),
                    Err(err) if *skip_failures => {
                        tracing::warn!(key = %key, error = %err, "skipping unloadable view entry");
                    }
                    Err(err) => return Some(Err(err)),
                }
            },
        }
    }
}
