//! Record - a dirty-tracked field map backed by one row.
//!
//! A record remembers the columns it last saw in the store (`original`),
//! which fields changed since then and which were deleted. `save` writes
//! only that difference: one remove per deleted column and a single batch
//! insert for the changed ones.
//!
//! ## Example
//!
//! ```ignore
//! use rowkeeper::{Key, Record};
//!
//! let mut post = Record::new();
//! post.load(&pool, &Key::with_row_id("blog", "posts", "post-1")?)?;
//! post.set("title", "Hello")?;
//! post.delete("draft");
//! post.save(&pool)?;
//! ```

mod schema;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::connection::Pool;
use crate::error::StoreError;
use crate::key::Key;
use crate::store::{self, Column, ConsistencyLevel, Mutation, SlicePredicate, Store};

pub use schema::{Plain, ReadOnly, Schema, SecondaryIndex};

/// An object backed by a row in the store.
#[derive(Clone)]
pub struct Record {
    key: Option<Key>,
    schema: Arc<dyn Schema>,
    fields: BTreeMap<String, String>,
    columns: BTreeMap<String, Column>,
    original: BTreeMap<String, Column>,
    modified: BTreeSet<String>,
    deleted: BTreeSet<String>,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    /// An empty record with no per-type behaviour.
    pub fn new() -> Self {
        Self::with_schema(Arc::new(Plain))
    }

    pub fn with_schema(schema: Arc<dyn Schema>) -> Self {
        Record {
            key: None,
            schema,
            fields: BTreeMap::new(),
            columns: BTreeMap::new(),
            original: BTreeMap::new(),
            modified: BTreeSet::new(),
            deleted: BTreeSet::new(),
        }
    }

    /// Load a record of `schema` from `key` in one step.
    pub fn fetch(
        pool: &Pool,
        schema: Arc<dyn Schema>,
        key: &Key,
        consistency: ConsistencyLevel,
    ) -> Result<Self, StoreError> {
        let mut record = Self::with_schema(schema);
        record.load_at(pool, key, consistency)?;
        Ok(record)
    }

    /// Build a record from columns fetched elsewhere (bulk loads).
    pub(crate) fn from_columns(schema: Arc<dyn Schema>, key: Key, columns: Vec<Column>) -> Self {
        let mut record = Self::with_schema(schema);
        record.inject(key, columns);
        record
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Attach a key. Pending changes are kept and will be written under it.
    pub fn set_key(&mut self, key: Key) {
        self.key = Some(key);
    }

    pub fn schema(&self) -> &Arc<dyn Schema> {
        &self.schema
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// The visible field map.
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether anything would be written by `save`.
    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty() || !self.deleted.is_empty()
    }

    /// Required fields absent from the record.
    pub fn missing(&self) -> Vec<String> {
        self.schema
            .required()
            .iter()
            .filter(|name| !self.fields.contains_key(**name))
            .map(|name| name.to_string())
            .collect()
    }

    pub fn valid(&self) -> bool {
        self.missing().is_empty()
    }

    /// Assign a field. Non-string values are stored as their JSON text;
    /// `null` is rejected, use `delete` instead.
    ///
    /// Assigning the value the store already holds leaves the field clean.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<(), StoreError> {
        let value = normalize(value.into())?;
        self.set_normalized(name.into(), value);
        Ok(())
    }

    fn set_normalized(&mut self, name: String, value: String) {
        if let Some(original) = self.original.get(&name) {
            if original.value == value {
                self.fields.insert(name.clone(), value);
                self.columns.insert(name.clone(), original.clone());
                self.modified.remove(&name);
                self.deleted.remove(&name);
                return;
            }
        }

        self.deleted.remove(&name);
        self.modified.insert(name.clone());
        self.columns
            .insert(name.clone(), Column::new(name.clone(), value.clone(), store::timestamp()));
        self.fields.insert(name, value);
    }

    /// Assign several fields. Nothing is assigned if any value is `null`.
    pub fn update<I, K, V>(&mut self, values: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let normalized = values
            .into_iter()
            .map(|(name, value)| Ok((name.into(), normalize(value.into())?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        for (name, value) in normalized {
            self.set_normalized(name, value);
        }
        Ok(())
    }

    /// Make the record hold exactly `payload`: every payload field is set
    /// and every field absent from it is deleted.
    pub fn replace_with(&mut self, payload: &serde_json::Map<String, Value>) -> Result<(), StoreError> {
        let normalized = payload
            .iter()
            .map(|(name, value)| Ok((name.clone(), normalize(value.clone())?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let stale: Vec<String> = self
            .fields
            .keys()
            .filter(|name| !payload.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            self.delete(&name);
        }

        for (name, value) in normalized {
            self.set_normalized(name, value);
        }
        Ok(())
    }

    /// Remove a field. Only fields the store holds become pending deletes.
    /// Returns whether the field was present.
    pub fn delete(&mut self, name: &str) -> bool {
        if self.fields.remove(name).is_none() {
            return false;
        }
        self.columns.remove(name);
        self.modified.remove(name);
        if self.original.contains_key(name) {
            self.deleted.insert(name.to_string());
        }
        true
    }

    /// Discard pending changes, restoring the state last seen in the store.
    pub fn revert(&mut self) {
        self.fields = self
            .original
            .iter()
            .map(|(name, column)| (name.clone(), column.value.clone()))
            .collect();
        self.columns = self.original.clone();
        self.modified.clear();
        self.deleted.clear();
    }

    /// The visible fields as a JSON object of strings.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                .collect(),
        )
    }

    fn clean(&mut self) {
        self.key = None;
        self.fields.clear();
        self.columns.clear();
        self.original.clear();
        self.modified.clear();
        self.deleted.clear();
    }

    fn inject(&mut self, key: Key, columns: Vec<Column>) {
        self.key = Some(key);
        self.original = columns
            .into_iter()
            .map(|column| (column.name.clone(), column))
            .collect();
        self.revert();
    }

    /// Load the row at `key`, replacing all state.
    pub fn load(&mut self, pool: &Pool, key: &Key) -> Result<(), StoreError> {
        self.load_at(pool, key, pool.consistency())
    }

    /// Load the row with `row_id`, addressed through the schema.
    pub fn load_id(&mut self, pool: &Pool, row_id: &str) -> Result<(), StoreError> {
        let key = self.schema.key_for(row_id)?;
        self.load(pool, &key)
    }

    pub fn load_at(
        &mut self,
        pool: &Pool,
        key: &Key,
        consistency: ConsistencyLevel,
    ) -> Result<(), StoreError> {
        self.clean();

        let client = pool.acquire(key.namespace())?;
        let columns = client.get_slice(
            key.namespace(),
            key.row_id(),
            &key.parent(),
            &SlicePredicate::full(),
            consistency,
        )?;

        if columns.is_empty() {
            return Err(StoreError::NoSuchRecord(key.to_string()));
        }

        self.inject(key.clone(), columns);
        Ok(())
    }

    /// Write pending changes.
    pub fn save(&mut self, pool: &Pool) -> Result<(), StoreError> {
        self.save_at(pool, pool.consistency())
    }

    /// Write pending changes to the record's row, then to every mirror, then
    /// append the record to every index.
    ///
    /// Only a failure of the primary write leaves the record dirty. Mirror
    /// and index failures are returned after all of them have been attempted,
    /// with the record already clean.
    pub fn save_at(&mut self, pool: &Pool, consistency: ConsistencyLevel) -> Result<(), StoreError> {
        if self.schema.immutable() {
            return Err(StoreError::Immutable);
        }

        let missing = self.missing();
        if !missing.is_empty() {
            return Err(StoreError::MissingField(missing));
        }

        let key = match &self.key {
            Some(key) => key.clone(),
            None => {
                let key = self.schema.default_key()?;
                self.key = Some(key.clone());
                key
            }
        };

        if !self.is_modified() {
            return Ok(());
        }

        self.write_diff(pool, &key, consistency)?;

        let mut failure = None;
        for mirror in self.schema.mirrors(self) {
            if let Err(err) = self.write_diff(pool, &mirror, consistency) {
                tracing::warn!(key = %key, mirror = %mirror, error = %err, "mirror save failed");
                failure.get_or_insert(err);
            }
        }
        for index in self.schema.indexes(self) {
            if let Err(err) = index.append(pool, self) {
                tracing::warn!(key = %key, error = %err, "index append failed");
                failure.get_or_insert(err);
            }
        }

        self.modified.clear();
        self.deleted.clear();
        self.original = self.columns.clone();

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn write_diff(&self, pool: &Pool, key: &Key, consistency: ConsistencyLevel) -> Result<(), StoreError> {
        let client = pool.acquire(key.namespace())?;

        let now = store::timestamp();
        for name in &self.deleted {
            client.remove(
                key.namespace(),
                key.row_id(),
                &key.column_path(name.clone()),
                now,
                consistency,
            )?;
        }

        let changed: Vec<Column> = self
            .modified
            .iter()
            .filter_map(|name| self.columns.get(name).cloned())
            .collect();
        if !changed.is_empty() {
            client.batch_insert(
                key.namespace(),
                key.row_id(),
                batch_mutations(key, changed),
                consistency,
            )?;
        }
        Ok(())
    }

    /// Delete the record's row in the store and clear the record.
    pub fn remove(&mut self, pool: &Pool) -> Result<(), StoreError> {
        self.remove_at(pool, pool.consistency())
    }

    pub fn remove_at(&mut self, pool: &Pool, consistency: ConsistencyLevel) -> Result<(), StoreError> {
        let key = self.key.clone().ok_or(StoreError::MissingKey)?;
        let client = pool.acquire(key.namespace())?;
        client.remove(
            key.namespace(),
            key.row_id(),
            &key.path(),
            store::timestamp(),
            consistency,
        )?;
        self.clean();
        Ok(())
    }
}

/// Wrap changed columns for a batch insert under `key`.
fn batch_mutations(key: &Key, columns: Vec<Column>) -> BTreeMap<String, Vec<Mutation>> {
    let mutations = match key.sub_collection() {
        Some(sub) => vec![Mutation::SubCollection {
            name: sub.to_string(),
            columns,
        }],
        None => columns.into_iter().map(Mutation::Column).collect(),
    };

    let mut batch = BTreeMap::new();
    batch.insert(key.collection().to_string(), mutations);
    batch
}

/// The text form a value is stored as.
pub fn normalize(value: Value) -> Result<String, StoreError> {
    match value {
        Value::Null => Err(StoreError::InvalidValue(
            "fields may not be set to null".into(),
        )),
        Value::String(text) => Ok(text),
        Value::Bool(flag) => Ok(flag.to_string()),
        Value::Number(number) => Ok(number.to_string()),
        other => Ok(serde_json::to_string(&other)?),
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("key", &self.key)
            .field("fields", &self.fields)
            .field("modified", &self.modified)
            .field("deleted", &self.deleted)
            .finish()
    }
}
