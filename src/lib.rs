//! Object-style records over a wide-row column store.
//!
//! - `Key` addresses a row (or a sub-collection in one).
//! - `Record` tracks changes to a row and writes only the difference.
//! - `RecordSet` validates and saves many records, `KeyRecordSet` bulk-loads.
//! - `View` and `PartitionedView` are paginated pointer lists over records.
//! - `Pool` hands out load-balanced per-thread clients for each namespace.
//!
//! The remote store is abstracted by the `Store` trait; `InMemoryStore`
//! implements it for tests and development.

extern crate self as rowkeeper;

mod config;
mod connection;
mod error;
mod key;
mod record;
mod record_set;
mod store;
mod view;

#[cfg(feature = "http")]
pub mod http;

pub use config::Config;
pub use connection::{
    acquire, global, register_pool, set_global, Client, Connector, InMemoryConnector,
    InMemoryTransport, Pool, Transport, TransportStats,
};
pub use error::StoreError;
pub use key::{Key, KeyField, KeyOverrides};
pub use record::{normalize, Plain, ReadOnly, Record, Schema, SecondaryIndex};
pub use record_set::{KeyRecordSet, RecordSet};
pub use store::{
    timestamp, Column, ColumnParent, ColumnPath, ConsistencyLevel, InMemoryStore, Mutation,
    SlicePredicate, SliceRange, Store, StoreOp,
};
pub use view::{
    DailyPartitions, KeyCursor, LoadMode, PartitionRecords, PartitionedView, Partitioner,
    Records, View,
};

// The derive macro for the trait of the same name.
pub use rowkeeper_macros::Schema;
