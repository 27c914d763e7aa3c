//! Integration tests for record sets.

use std::collections::BTreeMap;
use std::sync::Arc;

use rowkeeper::{
    InMemoryConnector, Key, KeyRecordSet, Pool, Record, RecordSet, Schema, StoreError, StoreOp,
};

#[derive(Schema)]
#[schema(namespace = "shop", required("sku", "price"))]
struct Product;

fn product(row_id: &str, fields: &[(&str, &str)]) -> Record {
    let mut record = Record::with_schema(Arc::new(Product));
    record.set_key(Product.key_for(row_id).unwrap());
    record
        .update(fields.iter().map(|(name, value)| (name.to_string(), value.to_string())))
        .unwrap();
    record
}

fn setup() -> (Pool, InMemoryConnector) {
    let connector = InMemoryConnector::new();
    let pool = Pool::new(connector.clone());
    pool.register("shop", ["127.0.0.1:9160"]).unwrap();
    (pool, connector)
}

#[test]
fn one_invalid_record_blocks_the_whole_set() {
    let (pool, connector) = setup();
    let mut set = RecordSet::from_records([
        product("p1", &[("sku", "A-1"), ("price", "10")]),
        product("p2", &[("sku", "A-2")]),
        product("p3", &[("price", "30")]),
    ])
    .unwrap();

    let err = set.save(&pool).unwrap_err();
    let mut expected = BTreeMap::new();
    expected.insert("p2".to_string(), vec!["price".to_string()]);
    expected.insert("p3".to_string(), vec!["sku".to_string()]);
    assert_eq!(err, StoreError::MissingFields(expected));
    assert_eq!(connector.store().write_count(), 0);

    set.get_mut("p2").unwrap().set("price", 20).unwrap();
    set.get_mut("p3").unwrap().set("sku", "A-3").unwrap();
    set.save(&pool).unwrap();
    assert_eq!(connector.store().op_count(StoreOp::BatchInsert), 3);
    assert!(set.iter().all(|record| !record.is_modified()));
}

#[test]
fn only_modified_records_are_saved_or_validated() {
    let (pool, connector) = setup();
    let mut set = RecordSet::from_records([
        product("p1", &[("sku", "A-1"), ("price", "10")]),
        product("p2", &[("sku", "A-2"), ("price", "20")]),
    ])
    .unwrap();
    set.save(&pool).unwrap();

    let keys: Vec<Key> = ["p1", "p2", "missing"]
        .iter()
        .map(|row_id| Product.key_for(row_id).unwrap())
        .collect();
    let mut loaded = KeyRecordSet::load(&pool, &keys, Arc::new(Product)).unwrap();
    assert_eq!(loaded.len(), 2);
    assert!(!loaded.contains("missing"));

    connector.store().reset_counts();
    loaded.get_mut("p2").unwrap().set("price", "25").unwrap();
    loaded.save(&pool).unwrap();
    assert_eq!(connector.store().write_count(), 1);
}

#[test]
fn scan_a_collection() {
    let (pool, _) = setup();
    let mut set = RecordSet::from_records(
        ["a", "b", "c", "d"].map(|id| product(id, &[("sku", id), ("price", "1")])),
    )
    .unwrap();
    set.save(&pool).unwrap();

    let template = Product.default_key().unwrap();
    let scanned = KeyRecordSet::scan(&pool, &template, "b", "c", 100, Arc::new(Product)).unwrap();
    assert_eq!(scanned.row_ids().collect::<Vec<_>>(), ["b", "c"]);
    assert_eq!(scanned.get("c").unwrap().get("sku"), Some("c"));
}
