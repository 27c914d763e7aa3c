//! HTTP adapter integration tests.
//!
//! Starts an axum server and exercises it with reqwest.

#![cfg(feature = "http")]

use std::sync::Arc;

use rowkeeper::http::{self, HttpState};
use rowkeeper::{Config, InMemoryConnector, Pool};
use serde_json::{json, Value};

/// Bind to port 0 and return the actual address.
async fn start_server() -> String {
    let pool = Arc::new(Pool::new(InMemoryConnector::new()));
    let app = http::router(Arc::new(HttpState::new(pool, Config::default())));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn banner() {
    let base = start_server().await;
    let body = reqwest::get(format!("{base}/")).await.unwrap().text().await.unwrap();
    assert!(body.contains("HTTP/JSON"));
}

#[tokio::test]
async fn put_normalizes_values_to_text() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/record/put?ks=app&cf=users&k=u1"))
        .json(&json!({ "k1": "v1", "k2": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "k1": "v1", "k2": "2" }));

    let resp = client
        .get(format!("{base}/record/get?ks=app&cf=users&k=u1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "k1": "v1", "k2": "2" }));
}

#[tokio::test]
async fn put_replaces_fields() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/record/put?ks=app&cf=users&k=u2"))
        .json(&json!({ "name": "ada", "role": "admin" }))
        .send()
        .await
        .unwrap();

    // `v` carries the payload on a plain GET.
    let resp = client
        .get(format!("{base}/record/put"))
        .query(&[("ks", "app"), ("cf", "users"), ("k", "u2"), ("v", r#"{"name":"ada l."}"#)])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = client
        .get(format!("{base}/record/get?ks=app&cf=users&k=u2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "name": "ada l." }));
}

#[tokio::test]
async fn missing_record_is_404() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/record/get?ks=app&cf=users&k=nobody"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .get(format!("{base}/record/delete?ks=app&cf=users&k=nobody"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn delete_then_get() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/record/put?ks=app&cf=users&k=u3"))
        .json(&json!({ "name": "grace" }))
        .send()
        .await
        .unwrap();

    let resp = client
        .get(format!("{base}/record/delete?ks=app&cf=users&k=u3"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "deleteItem": "success" }));

    let resp = client
        .get(format!("{base}/record/get?ks=app&cf=users&k=u3"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn bad_requests_are_500() {
    let base = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/record/get?ks=app&cf=users"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("key"));

    let resp = client
        .post(format!("{base}/record/put?ks=app&cf=users&k=u4"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);

    let resp = client
        .post(format!("{base}/record/put?ks=app&cf=users&k=u4"))
        .json(&json!({ "gone": null }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
}
