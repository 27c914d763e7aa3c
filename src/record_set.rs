//! RecordSet - records keyed by row id, saved and loaded in bulk.
//!
//! ## Example
//!
//! ```ignore
//! use rowkeeper::{KeyRecordSet, Plain};
//!
//! let posts = KeyRecordSet::load(&pool, &keys, Arc::new(Plain))?;
//! for post in posts.iter() {
//!     println!("{}", post.get("title").unwrap_or_default());
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::connection::Pool;
use crate::error::StoreError;
use crate::key::Key;
use crate::record::{Record, Schema};
use crate::store::{ColumnParent, ConsistencyLevel, SlicePredicate, Store};

/// Records keyed by row id, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    order: Vec<String>,
    records: HashMap<String, Record>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from keyed records.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Result<Self, StoreError> {
        let mut set = Self::new();
        for record in records {
            set.append(record)?;
        }
        Ok(set)
    }

    /// Add a record under its row id, replacing any record with the same id.
    pub fn append(&mut self, record: Record) -> Result<(), StoreError> {
        let row_id = record
            .key()
            .ok_or(StoreError::MissingKey)?
            .row_id()
            .to_string();
        if self.records.insert(row_id.clone(), record).is_none() {
            self.order.push(row_id);
        }
        Ok(())
    }

    pub fn get(&self, row_id: &str) -> Option<&Record> {
        self.records.get(row_id)
    }

    pub fn get_mut(&mut self, row_id: &str) -> Option<&mut Record> {
        self.records.get_mut(row_id)
    }

    pub fn contains(&self, row_id: &str) -> bool {
        self.records.contains_key(row_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn row_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.order.iter().filter_map(|row_id| self.records.get(row_id))
    }

    /// Row id → missing required fields, for every invalid modified record.
    pub fn missing(&self) -> BTreeMap<String, Vec<String>> {
        self.modified()
            .filter(|(_, record)| !record.valid())
            .map(|(row_id, record)| (row_id.to_string(), record.missing()))
            .collect()
    }

    pub fn valid(&self) -> bool {
        self.missing().is_empty()
    }

    fn modified(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.order.iter().filter_map(|row_id| {
            self.records
                .get(row_id)
                .filter(|record| record.is_modified())
                .map(|record| (row_id.as_str(), record))
        })
    }

    /// Save every modified record.
    ///
    /// Validation covers the whole set first: if any modified record is
    /// missing required fields nothing is written. Records then save one at
    /// a time; every record is attempted and the first failure is returned.
    pub fn save(&mut self, pool: &Pool) -> Result<(), StoreError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(StoreError::MissingFields(missing));
        }

        let pending: Vec<String> = self.modified().map(|(row_id, _)| row_id.to_string()).collect();
        tracing::debug!(records = pending.len(), "saving record set");

        let mut failure = None;
        for row_id in pending {
            if let Some(record) = self.records.get_mut(&row_id) {
                if let Err(err) = record.save(pool) {
                    tracing::warn!(row_id = %row_id, error = %err, "record save failed");
                    failure.get_or_insert(err);
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl IntoIterator for RecordSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(mut self) -> Self::IntoIter {
        self.order
            .iter()
            .filter_map(|row_id| self.records.remove(row_id))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// A `RecordSet` populated by bulk loads.
pub struct KeyRecordSet;

impl KeyRecordSet {
    /// Load every key with one multiget per (namespace, collection,
    /// sub-collection). Keys whose rows do not exist are left out.
    pub fn load(pool: &Pool, keys: &[Key], schema: Arc<dyn Schema>) -> Result<RecordSet, StoreError> {
        RecordSet::from_records(multiget(pool, keys, schema, pool.consistency())?)
    }

    /// Load up to `count` rows of the template key's collection whose row
    /// ids fall in `[start, finish]`.
    pub fn scan(
        pool: &Pool,
        template: &Key,
        start: &str,
        finish: &str,
        count: usize,
        schema: Arc<dyn Schema>,
    ) -> Result<RecordSet, StoreError> {
        let client = pool.acquire(template.namespace())?;
        let row_ids = client.get_key_range(
            template.namespace(),
            template.collection(),
            start,
            finish,
            count,
            pool.consistency(),
        )?;

        let keys: Vec<Key> = row_ids.into_iter().map(|row_id| template.for_row(row_id)).collect();
        Self::load(pool, &keys, schema)
    }
}

/// A namespace and the container one multiget reads from.
type Group = (String, ColumnParent);

/// Load `keys` in bulk, returning records in key order. A key that repeats
/// yields a record each time it appears; missing rows are skipped.
pub(crate) fn multiget(
    pool: &Pool,
    keys: &[Key],
    schema: Arc<dyn Schema>,
    consistency: ConsistencyLevel,
) -> Result<Vec<Record>, StoreError> {
    let mut groups: Vec<(Group, Vec<String>)> = Vec::new();
    for key in keys {
        let group = (key.namespace().to_string(), key.parent());
        match groups.iter_mut().find(|(existing, _)| *existing == group) {
            Some((_, row_ids)) => {
                if !row_ids.iter().any(|row_id| row_id == key.row_id()) {
                    row_ids.push(key.row_id().to_string());
                }
            }
            None => groups.push((group, vec![key.row_id().to_string()])),
        }
    }

    let mut fetched: HashMap<Group, BTreeMap<String, Vec<_>>> = HashMap::new();
    for ((namespace, parent), row_ids) in groups {
        tracing::debug!(namespace = %namespace, collection = %parent.collection, rows = row_ids.len(), "multiget");
        let client = pool.acquire(&namespace)?;
        let rows = client.multiget_slice(
            &namespace,
            &row_ids,
            &parent,
            &SlicePredicate::full(),
            consistency,
        )?;
        fetched.insert((namespace, parent), rows);
    }

    let mut records = Vec::with_capacity(keys.len());
    for key in keys {
        let group = (key.namespace().to_string(), key.parent());
        let columns = fetched
            .get(&group)
            .and_then(|rows| rows.get(key.row_id()))
            .cloned()
            .unwrap_or_default();
        if columns.is_empty() {
            continue;
        }
        records.push(Record::from_columns(schema.clone(), key.clone(), columns));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::InMemoryConnector;
    use crate::record::Plain;
    use crate::store::{InMemoryStore, StoreOp};

    fn setup() -> (Pool, InMemoryStore) {
        let connector = InMemoryConnector::new();
        let store = connector.store().clone();
        let pool = Pool::new(connector);
        pool.register("ks", ["127.0.0.1:9160"]).unwrap();
        (pool, store)
    }

    fn saved(pool: &Pool, collection: &str, row_id: &str, sub: Option<&str>) -> Key {
        let key = Key::build("ks", collection, Some(row_id.into()), sub.map(str::to_string)).unwrap();
        let mut record = Record::new();
        record.set_key(key.clone());
        record.set("id", row_id).unwrap();
        record.save(pool).unwrap();
        key
    }

    #[test]
    fn append_replaces_same_row_id() {
        let mut set = RecordSet::new();
        let key = Key::with_row_id("ks", "cf", "r1").unwrap();

        let mut first = Record::new();
        first.set_key(key.clone());
        first.set("v", "1").unwrap();
        let mut second = Record::new();
        second.set_key(key);
        second.set("v", "2").unwrap();

        set.append(first).unwrap();
        set.append(second).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("r1").unwrap().get("v"), Some("2"));
    }

    #[test]
    fn append_requires_key() {
        let mut set = RecordSet::new();
        assert_eq!(set.append(Record::new()).unwrap_err(), StoreError::MissingKey);
    }

    #[test]
    fn load_groups_by_container() {
        let (pool, store) = setup();
        let keys = vec![
            saved(&pool, "a", "r1", None),
            saved(&pool, "b", "r2", None),
            saved(&pool, "a", "r3", None),
            saved(&pool, "a", "r4", Some("nested")),
        ];
        let mut requested = keys.clone();
        requested.push(Key::with_row_id("ks", "a", "gone").unwrap());
        store.reset_counts();

        let set = KeyRecordSet::load(&pool, &requested, Arc::new(Plain)).unwrap();

        assert_eq!(store.op_count(StoreOp::MultigetSlice), 3);
        assert_eq!(store.op_count(StoreOp::GetSlice), 0);
        assert_eq!(set.row_ids().collect::<Vec<_>>(), ["r1", "r2", "r3", "r4"]);
        assert_eq!(set.get("r4").unwrap().key(), Some(&keys[3]));
        assert!(set.iter().all(|record| !record.is_modified()));
    }

    #[test]
    fn repeated_keys_fetch_once_and_load_each_time() {
        let (pool, store) = setup();
        let a = saved(&pool, "cf", "a", None);
        let b = saved(&pool, "cf", "b", None);
        store.reset_counts();

        let records = multiget(
            &pool,
            &[a.clone(), b, a],
            Arc::new(Plain),
            ConsistencyLevel::One,
        )
        .unwrap();

        let ids: Vec<&str> = records.iter().filter_map(|record| record.get("id")).collect();
        assert_eq!(ids, ["a", "b", "a"]);
        assert_eq!(store.op_count(StoreOp::MultigetSlice), 1);
    }

    #[test]
    fn scan_loads_key_range() {
        let (pool, _) = setup();
        for row_id in ["a1", "a2", "b1", "c1"] {
            saved(&pool, "cf", row_id, None);
        }
        let template = Key::with_row_id("ks", "cf", "template").unwrap();

        let set = KeyRecordSet::scan(&pool, &template, "a", "b9", 10, Arc::new(Plain)).unwrap();
        assert_eq!(set.row_ids().collect::<Vec<_>>(), ["a1", "a2", "b1"]);

        let set = KeyRecordSet::scan(&pool, &template, "", "", 2, Arc::new(Plain)).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn into_iter_keeps_order() {
        let (pool, _) = setup();
        let keys = vec![saved(&pool, "cf", "z", None), saved(&pool, "cf", "a", None)];
        let set = KeyRecordSet::load(&pool, &keys, Arc::new(Plain)).unwrap();

        let ids: Vec<String> = set
            .into_iter()
            .map(|record| record.get("id").unwrap_or_default().to_string())
            .collect();
        assert_eq!(ids, ["z", "a"]);
    }
}
