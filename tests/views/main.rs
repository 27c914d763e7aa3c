//! Integration tests for views and partitioned views.

use std::sync::Arc;

use chrono::NaiveDate;
use rowkeeper::{
    Config, DailyPartitions, InMemoryConnector, InMemoryStore, Key, LoadMode, PartitionedView,
    Pool, Record, Schema, StoreError, StoreOp, View,
};

#[derive(Schema)]
#[schema(namespace = "news", collection = "stories", required("headline"))]
struct Story;

fn pool() -> (Pool, InMemoryStore) {
    let config = Config::from_json_str(
        r#"{ "pools": { "news": ["10.0.0.1:9160", "10.0.0.2:9160", "10.0.0.3:9160"] } }"#,
    )
    .unwrap();
    let connector = InMemoryConnector::new();
    let store = connector.store().clone();
    (Pool::from_config(&config, connector).unwrap(), store)
}

fn story(pool: &Pool, row_id: &str) -> Record {
    let mut record = Record::with_schema(Arc::new(Story));
    record.set_key(Story.key_for(row_id).unwrap());
    record.set("headline", format!("headline {}", row_id)).unwrap();
    record.save(pool).unwrap();
    record
}

fn view(mode: LoadMode) -> View {
    View::new(
        Key::with_row_id("news", "sections", "sports").unwrap(),
        Story.default_key().unwrap(),
    )
    .with_schema(Arc::new(Story))
    .with_mode(mode)
}

#[test]
fn three_hundred_entries_in_pages_of_one_hundred() {
    let (pool, store) = pool();
    let view = view(LoadMode::Strict);
    assert_eq!(view.chunk_size(), 100);
    for i in 0..300 {
        view.append(&pool, &story(&pool, &format!("s{:03}", i))).unwrap();
    }
    store.reset_counts();

    let keys: Vec<Key> = view.keys(&pool, "", "").collect::<Result<_, _>>().unwrap();
    let mut ids: Vec<&str> = keys.iter().map(Key::row_id).collect();
    assert_eq!(ids.len(), 300);
    ids.dedup();
    assert_eq!(ids.len(), 300);
    assert!(keys.iter().all(|key| key.collection() == "stories"));
    assert_eq!(store.op_count(StoreOp::GetSlice), 4);
}

#[test]
fn empty_view_in_every_mode() {
    let (pool, _) = pool();
    for mode in [LoadMode::Strict, LoadMode::FaultTolerant, LoadMode::Batch] {
        assert_eq!(view(mode).records(&pool).count(), 0);
    }
}

#[test]
fn records_keep_view_order_and_schema() {
    let (pool, _) = pool();
    let view = view(LoadMode::Strict).reversed(true);
    for row_id in ["a", "b", "c"] {
        view.append(&pool, &story(&pool, row_id)).unwrap();
    }

    let records: Vec<Record> = view.records(&pool).collect::<Result<_, _>>().unwrap();
    let headlines: Vec<&str> = records.iter().filter_map(|r| r.get("headline")).collect();
    assert_eq!(headlines, ["headline c", "headline b", "headline a"]);

    let mut edited = records[0].clone();
    edited.delete("headline");
    assert_eq!(
        edited.save(&pool).unwrap_err(),
        StoreError::MissingField(vec!["headline".into()])
    );
}

#[test]
fn removed_stories_by_mode() {
    let (pool, _) = pool();
    let strict = view(LoadMode::Strict);
    for row_id in ["a", "b", "c"] {
        strict.append(&pool, &story(&pool, row_id)).unwrap();
    }
    let mut removed = Record::with_schema(Arc::new(Story));
    removed.load_id(&pool, "b").unwrap();
    removed.remove(&pool).unwrap();

    let errors = strict.records(&pool).filter(|r| r.is_err()).count();
    assert_eq!(errors, 1);

    for mode in [LoadMode::FaultTolerant, LoadMode::Batch] {
        let ids: Vec<String> = view(mode)
            .records(&pool)
            .map(|r| r.unwrap().key().unwrap().row_id().to_string())
            .collect();
        assert_eq!(ids, ["a", "c"], "{:?}", mode);
    }
}

#[test]
fn unregistered_namespace_surfaces_from_cursor() {
    let (pool, _) = pool();
    let view = View::new(
        Key::with_row_id("elsewhere", "sections", "sports").unwrap(),
        Story.default_key().unwrap(),
    );
    let results: Vec<_> = view.keys(&pool, "", "").collect();
    assert_eq!(results, [Err(StoreError::PoolNotFound("elsewhere".into()))]);
}

#[test]
fn daily_partitioned_feed() {
    let (pool, _) = pool();
    let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let prototype = View::batch(
        Key::with_row_id("news", "daily", "template").unwrap(),
        Story.default_key().unwrap(),
    )
    .with_schema(Arc::new(Story));

    let feed = PartitionedView::new(DailyPartitions::new(today, 7), prototype.clone());
    feed.append(&pool, &story(&pool, "today")).unwrap();

    // Yesterday's entries live in the previous partition.
    let yesterday = prototype.at_row("20231231");
    yesterday.append(&pool, &story(&pool, "yesterday")).unwrap();

    let views = feed.views();
    assert_eq!(views.len(), 7);
    assert_eq!(views[0].key().row_id(), "20240101");
    assert_eq!(views[1].key().row_id(), "20231231");

    let ids: Vec<String> = feed
        .records(&pool)
        .map(|r| r.unwrap().key().unwrap().row_id().to_string())
        .collect();
    assert_eq!(ids, ["today", "yesterday"]);
    assert_eq!(feed.count(&pool).unwrap(), 2);
}
