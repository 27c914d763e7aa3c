//! Integration tests for records: dirty tracking, schemas, mirrors and
//! indexes.

mod support;

use std::sync::Arc;

use rowkeeper::{
    Key, KeyOverrides, ReadOnly, Record, Schema, StoreError, StoreOp, View,
};
use serde_json::json;
use support::{Author, BlogPost, Harness, IndexedPost, SERVERS};

#[test]
fn derived_schema_attributes() {
    assert_eq!(BlogPost.required(), ["title", "body"]);
    let key = BlogPost.default_key().unwrap();
    assert_eq!(key.namespace(), "blog");
    assert_eq!(key.collection(), "blog_posts");

    assert_eq!(Author.required(), ["name"]);
    assert_eq!(Author.default_key().unwrap_err(), StoreError::MissingKey);
}

#[test]
fn required_fields_block_save_until_set() {
    let h = Harness::new();
    let mut post = Record::with_schema(Arc::new(BlogPost));
    post.set("title", "Hello").unwrap();

    let err = post.save(&h.pool).unwrap_err();
    assert_eq!(err, StoreError::MissingField(vec!["body".into()]));
    assert_eq!(h.store().write_count(), 0);
    assert!(post.key().is_none());

    post.set("body", "First post").unwrap();
    post.save(&h.pool).unwrap();

    let key = post.key().unwrap().clone();
    assert_eq!(key.collection(), "blog_posts");
    assert_eq!(key.row_id().len(), 32);
    assert_eq!(h.load(&key).get("body"), Some("First post"));
}

#[test]
fn unchanged_load_save_is_free() {
    let h = Harness::new();
    let mut post = Record::with_schema(Arc::new(BlogPost));
    post.update([("title", "t"), ("body", "b")]).unwrap();
    post.save(&h.pool).unwrap();
    let key = post.key().unwrap().clone();

    let mut loaded = Record::with_schema(Arc::new(BlogPost));
    loaded.load(&h.pool, &key).unwrap();
    h.store().reset_counts();

    loaded.set("title", "t").unwrap();
    loaded.save(&h.pool).unwrap();
    assert_eq!(h.store().write_count(), 0);
}

#[test]
fn revert_after_mixed_changes() {
    let h = Harness::new();
    let key = Key::with_row_id("blog", "drafts", "d1").unwrap();
    let mut draft = Record::new();
    draft.set_key(key.clone());
    draft.update([("a", json!(1)), ("b", json!("two"))]).unwrap();
    draft.save(&h.pool).unwrap();

    let mut loaded = h.load(&key);
    let snapshot = loaded.to_json();
    loaded.set("a", 5).unwrap();
    loaded.delete("b");
    loaded.set("c", json!([1, 2])).unwrap();
    loaded.revert();

    assert_eq!(loaded.to_json(), snapshot);
    assert_eq!(snapshot, json!({ "a": "1", "b": "two" }));
    assert!(!loaded.is_modified());
}

#[test]
fn nested_keys_share_a_row() {
    let h = Harness::new();
    let row = Key::with_row_id("blog", "profiles", "ada").unwrap();
    let settings = row.clone_with(KeyOverrides::new().sub_collection("settings"));
    let links = row.clone_with(KeyOverrides::new().sub_collection("links"));

    for (key, field) in [(&settings, "theme"), (&links, "homepage")] {
        let mut record = Record::new();
        record.set_key(key.clone());
        record.set(field, "x").unwrap();
        record.save(&h.pool).unwrap();
    }

    assert_eq!(h.load(&settings).keys().collect::<Vec<_>>(), ["theme"]);
    assert_eq!(h.load(&links).keys().collect::<Vec<_>>(), ["homepage"]);
}

#[test]
fn calls_spread_over_servers() {
    let h = Harness::new();
    let key = Key::with_row_id("blog", "drafts", "d1").unwrap();
    let mut draft = Record::new();
    draft.set_key(key.clone());
    draft.set("a", "1").unwrap();
    draft.save(&h.pool).unwrap();
    for _ in 0..3 {
        h.load(&key);
    }

    let calls: Vec<usize> = SERVERS
        .iter()
        .map(|server| h.connector.transport_stats(server).calls)
        .collect();
    assert_eq!(calls.iter().sum::<usize>(), 4);
    assert_eq!(calls, [2, 2]);
}

#[test]
fn mirrors_and_indexes_follow_saves() {
    let h = Harness::new();
    let schema = Arc::new(IndexedPost::new());
    let mut post = Record::with_schema(schema.clone());
    post.update([("title", "Hello"), ("author", "ada")]).unwrap();
    post.save(&h.pool).unwrap();
    let key = post.key().unwrap().clone();

    let mirror_key = Key::build("blog", "posts_by_author", Some("ada".into()), Some(key.row_id().into()))
        .unwrap();
    let mut mirror = Record::with_schema(Arc::new(ReadOnly::new(BlogPost)));
    mirror.load(&h.pool, &mirror_key).unwrap();
    assert_eq!(mirror.get("title"), Some("Hello"));

    mirror.set("title", "Edited").unwrap();
    assert_eq!(mirror.save(&h.pool).unwrap_err(), StoreError::Immutable);

    let listed: Vec<Record> = schema
        .front_page
        .records(&h.pool)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key(), Some(&key));

    // An edit reaches the mirror; the pointer is rewritten in place.
    post.set("title", "Hello again").unwrap();
    post.save(&h.pool).unwrap();
    mirror.load(&h.pool, &mirror_key).unwrap();
    assert_eq!(mirror.get("title"), Some("Hello again"));
    assert_eq!(schema.front_page.count(&h.pool).unwrap(), 1);
}

#[test]
fn view_as_index_survives_unregistered_mirror() {
    struct Scattered {
        index: Arc<View>,
    }

    impl Schema for Scattered {
        fn mirrors(&self, record: &Record) -> Vec<Key> {
            let row_id = record.key().map(|k| k.row_id().to_string());
            vec![Key::build("archive", "posts", row_id, None).unwrap()]
        }

        fn indexes(&self, _record: &Record) -> Vec<Arc<dyn rowkeeper::SecondaryIndex>> {
            vec![self.index.clone() as Arc<dyn rowkeeper::SecondaryIndex>]
        }
    }

    let h = Harness::new();
    let index = Arc::new(View::new(
        Key::with_row_id("blog", "indexes", "all").unwrap(),
        Key::with_row_id("blog", "posts", "template").unwrap(),
    ));
    let mut post = Record::with_schema(Arc::new(Scattered { index: index.clone() }));
    post.set_key(Key::with_row_id("blog", "posts", "p1").unwrap());
    post.set("title", "x").unwrap();

    let err = post.save(&h.pool).unwrap_err();
    assert_eq!(err, StoreError::PoolNotFound("archive".into()));
    assert!(!post.is_modified());
    assert_eq!(index.count(&h.pool).unwrap(), 1);
    assert_eq!(h.store().op_count(StoreOp::BatchInsert), 1);
}
