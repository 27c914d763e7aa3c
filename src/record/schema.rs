//! Schema - per-type record behaviour.

use std::sync::Arc;

use super::Record;
use crate::connection::Pool;
use crate::error::StoreError;
use crate::key::Key;

/// Capabilities a record type supplies.
///
/// Every method has a default, so `impl Schema for MyType {}` describes a
/// record with no required fields, no default key, no mirrors and no
/// indexes. `#[derive(Schema)]` generates `required` and `default_key` from
/// attributes.
pub trait Schema: Send + Sync {
    /// Fields that must be present for the record to be valid.
    fn required(&self) -> &[&'static str] {
        &[]
    }

    /// The key a record without one is saved under.
    fn default_key(&self) -> Result<Key, StoreError> {
        Err(StoreError::MissingKey)
    }

    /// The key for a bare row id.
    fn key_for(&self, row_id: &str) -> Result<Key, StoreError> {
        Ok(self.default_key()?.for_row(row_id))
    }

    /// Keys of read-only denormalized copies written alongside the record.
    fn mirrors(&self, _record: &Record) -> Vec<Key> {
        Vec::new()
    }

    /// Indexes the record is appended to after every save.
    fn indexes(&self, _record: &Record) -> Vec<Arc<dyn SecondaryIndex>> {
        Vec::new()
    }

    /// Immutable records reject `save`.
    fn immutable(&self) -> bool {
        false
    }
}

/// An index that can point at records, such as a `View`.
pub trait SecondaryIndex: Send + Sync {
    fn append(&self, pool: &Pool, record: &Record) -> Result<(), StoreError>;
}

/// Schema of a record with no per-type behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl Schema for Plain {}

/// Read-only view of another schema, for mirror targets.
///
/// Keeps the wrapped schema's addressing and validation, but every `save`
/// fails with `StoreError::Immutable`.
#[derive(Clone)]
pub struct ReadOnly(pub Arc<dyn Schema>);

impl ReadOnly {
    pub fn new(schema: impl Schema + 'static) -> Self {
        ReadOnly(Arc::new(schema))
    }
}

impl Schema for ReadOnly {
    fn required(&self) -> &[&'static str] {
        self.0.required()
    }

    fn default_key(&self) -> Result<Key, StoreError> {
        self.0.default_key()
    }

    fn key_for(&self, row_id: &str) -> Result<Key, StoreError> {
        self.0.key_for(row_id)
    }

    fn immutable(&self) -> bool {
        true
    }
}
