//! HTTP/JSON adapter over records.
//!
//! Requires the `http` feature. Uses axum for routing; store calls run on
//! tokio's blocking pool.
//!
//! ## Routes
//!
//! - `GET /` - banner.
//! - `GET /record/get?ks=..&cf=..&k=..` - the record's fields, or 404.
//! - `GET|POST /record/put?ks=..&cf=..&k=..[&v=json]` - make the record hold
//!   exactly the JSON object in the body (or in `v`), creating it if needed.
//! - `GET /record/delete?ks=..&cf=..&k=..` - delete the record, or 404.
//!
//! Namespaces not yet known to the pool are registered with
//! `Config::http_servers`.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rowkeeper::{http, Config, InMemoryConnector, Pool};
//!
//! let state = Arc::new(http::HttpState::new(
//!     Arc::new(Pool::new(InMemoryConnector::new())),
//!     Config::default(),
//! ));
//! http::serve(state, "0.0.0.0:8001").await?;
//! ```

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::connection::Pool;
use crate::error::StoreError;
use crate::key::Key;
use crate::record::Record;

const BANNER: &str = "rowkeeper - an HTTP/JSON interface to records";

/// Shared state of the HTTP adapter.
pub struct HttpState {
    pool: Arc<Pool>,
    config: Config,
}

impl HttpState {
    pub fn new(pool: Arc<Pool>, config: Config) -> Self {
        HttpState { pool, config }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Register `namespace` with the default addresses unless it is known.
    fn ensure_pool(&self, namespace: &str) -> Result<(), StoreError> {
        if !self.pool.is_registered(namespace) {
            self.pool
                .register(namespace, self.config.http_servers.iter().cloned())?;
        }
        Ok(())
    }
}

/// Build an axum `Router` serving the record endpoints.
pub fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(banner_handler))
        .route("/record/get", get(get_handler))
        .route("/record/get/", get(get_handler))
        .route("/record/put", get(put_handler).post(put_handler))
        .route("/record/put/", get(put_handler).post(put_handler))
        .route("/record/delete", get(delete_handler))
        .route("/record/delete/", get(delete_handler))
        .with_state(state)
}

/// Serve the record endpoints at the given address (e.g. `"0.0.0.0:8001"`).
pub async fn serve(state: Arc<HttpState>, addr: &str) -> Result<(), std::io::Error> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "serving records over http");
    axum::serve(listener, app).await
}

/// Query parameters shared by the record endpoints.
#[derive(Debug, Default, Deserialize)]
struct RecordParams {
    ks: Option<String>,
    cf: Option<String>,
    k: Option<String>,
    v: Option<String>,
}

impl RecordParams {
    fn key(&self) -> Result<Key, StoreError> {
        let (Some(ks), Some(cf), Some(k)) = (&self.ks, &self.cf, &self.k) else {
            return Err(missing_params());
        };
        if k.is_empty() {
            return Err(missing_params());
        }
        Key::with_row_id(ks.as_str(), cf.as_str(), k.as_str())
    }
}

fn missing_params() -> StoreError {
    StoreError::IncompleteKey("request must include a namespace, collection and key".into())
}

async fn banner_handler() -> &'static str {
    BANNER
}

async fn get_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<RecordParams>,
) -> Response {
    blocking(move || {
        let key = params.key()?;
        state.ensure_pool(key.namespace())?;

        let mut record = Record::new();
        record.load(&state.pool, &key)?;
        Ok(record.to_json())
    })
    .await
}

async fn put_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<RecordParams>,
    body: String,
) -> Response {
    blocking(move || {
        let key = params.key()?;
        let payload = payload(&body, params.v.as_deref())?;
        state.ensure_pool(key.namespace())?;

        let mut record = Record::new();
        match record.load(&state.pool, &key) {
            Ok(()) => record.replace_with(&payload)?,
            Err(StoreError::NoSuchRecord(_)) => {
                record.set_key(key);
                record.update(payload)?;
            }
            Err(err) => return Err(err),
        }
        record.save(&state.pool)?;
        Ok(record.to_json())
    })
    .await
}

async fn delete_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<RecordParams>,
) -> Response {
    blocking(move || {
        let key = params.key()?;
        state.ensure_pool(key.namespace())?;

        let mut record = Record::new();
        record.load(&state.pool, &key)?;
        record.remove(&state.pool)?;
        Ok(json!({ "deleteItem": "success" }))
    })
    .await
}

/// The JSON object from the request body, or from `v` when the body is empty.
fn payload(body: &str, v: Option<&str>) -> Result<Map<String, Value>, StoreError> {
    let text = if body.trim().is_empty() {
        v.ok_or_else(|| StoreError::InvalidValue("missing value".into()))?
    } else {
        body
    };
    match serde_json::from_str(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::InvalidValue("value must be a JSON object".into())),
    }
}

/// Run store work on the blocking pool and render its outcome.
async fn blocking<F>(work: F) -> Response
where
    F: FnOnce() -> Result<Value, StoreError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(value)) => (StatusCode::OK, Json(value)).into_response(),
        Ok(Err(err)) => error_response(&err),
        Err(join) => {
            let body = json!({ "error": join.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

fn error_response(err: &StoreError) -> Response {
    tracing::debug!(error = %err, "record request failed");
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({ "error": err.to_string() });
    (status, Json(body)).into_response()
}
