//! Shared fixtures: a pool over two in-memory "servers" and a few schemas.

use std::sync::Arc;

use rowkeeper::{
    InMemoryConnector, InMemoryStore, Key, Pool, Record, Schema, SecondaryIndex, View,
};

pub const SERVERS: [&str; 2] = ["127.0.0.1:9160", "127.0.0.2:9160"];

pub struct Harness {
    pub pool: Pool,
    pub connector: InMemoryConnector,
}

impl Harness {
    pub fn new() -> Self {
        let connector = InMemoryConnector::new();
        let pool = Pool::new(connector.clone());
        pool.register("blog", SERVERS).unwrap();
        Harness { pool, connector }
    }

    pub fn store(&self) -> &InMemoryStore {
        self.connector.store()
    }

    pub fn load(&self, key: &Key) -> Record {
        let mut record = Record::new();
        record.load(&self.pool, key).unwrap();
        record
    }
}

#[derive(Schema)]
#[schema(namespace = "blog", required("title", "body"))]
pub struct BlogPost;

#[derive(Schema)]
#[schema(collection = "authors", required("name"))]
pub struct Author;

/// A post that is copied into a per-author row and listed on a front page.
pub struct IndexedPost {
    pub front_page: Arc<View>,
}

impl IndexedPost {
    pub fn new() -> Self {
        IndexedPost {
            front_page: Arc::new(View::new(
                Key::with_row_id("blog", "front_pages", "home").unwrap(),
                Key::with_row_id("blog", "blog_posts", "template").unwrap(),
            )),
        }
    }
}

impl Schema for IndexedPost {
    fn required(&self) -> &[&'static str] {
        &["title"]
    }

    fn default_key(&self) -> Result<Key, rowkeeper::StoreError> {
        Key::new("blog", "blog_posts")
    }

    fn mirrors(&self, record: &Record) -> Vec<Key> {
        match (record.get("author"), record.key()) {
            (Some(author), Some(key)) => vec![Key::build(
                "blog",
                "posts_by_author",
                Some(author.to_string()),
                Some(key.row_id().to_string()),
            )
            .unwrap()],
            _ => Vec::new(),
        }
    }

    fn indexes(&self, _record: &Record) -> Vec<Arc<dyn SecondaryIndex>> {
        vec![self.front_page.clone() as Arc<dyn SecondaryIndex>]
    }
}
