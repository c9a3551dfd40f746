//! Scriptable HTTP peer for exercising the request task end to end.
//!
//! Every request outside `/__mock` is recorded and answered with the canned
//! response registered for its path, or 404 when none is. Tests drive it
//! in-process through `MockServer`; the binary exposes the same state over
//! the control routes.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The reply registered for one path.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CannedResponse {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
    /// Wait this long before answering.
    #[serde(default)]
    pub delay_ms: u64,
    /// When non-zero the body goes out in pieces of this many bytes, the
    /// first one with the headers and each later one `chunk_interval_ms` after
    /// the previous.
    #[serde(default)]
    pub chunk_size: usize,
    #[serde(default)]
    pub chunk_interval_ms: u64,
}

impl CannedResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
            delay_ms: 0,
            chunk_size: 0,
            chunk_interval_ms: 0,
        }
    }

    pub fn text(status: u16, content_type: &str, body: &str) -> Self {
        Self::new(status)
            .with_header("Content-Type", content_type)
            .with_body(body.as_bytes().to_vec())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }

    /// Stream the body `chunk_size` bytes at a time, `interval` apart.
    pub fn with_chunks(mut self, chunk_size: usize, interval: Duration) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_interval_ms = interval.as_millis() as u64;
        self
    }
}

/// One request as the server saw it. Header names arrive lowercased.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordedRequest {
    pub id: Uuid,
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone, Default)]
pub struct Db {
    responses: Arc<RwLock<HashMap<String, CannedResponse>>>,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
}

impl Db {
    pub async fn respond(&self, path: &str, response: CannedResponse) {
        self.responses.write().await.insert(path.to_string(), response);
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    /// Forget recorded requests and canned responses.
    pub async fn clear(&self) {
        self.requests.write().await.clear();
        self.responses.write().await.clear();
    }
}

pub fn app() -> Router {
    app_with_state(Db::default())
}

pub fn app_with_state(db: Db) -> Router {
    Router::new()
        .route("/__mock/responses/{*path}", put(register_response))
        .route("/__mock/requests", get(list_requests).delete(clear_requests))
        .fallback(record_and_reply)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// ---------------------------------------------------------------------------
// Control routes
// ---------------------------------------------------------------------------

async fn register_response(
    State(db): State<Db>,
    Path(path): Path<String>,
    Json(response): Json<CannedResponse>,
) -> StatusCode {
    db.respond(&format!("/{path}"), response).await;
    StatusCode::NO_CONTENT
}

async fn list_requests(State(db): State<Db>) -> Json<Vec<RecordedRequest>> {
    Json(db.requests().await)
}

async fn clear_requests(State(db): State<Db>) -> StatusCode {
    db.requests.write().await.clear();
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// Everything else
// ---------------------------------------------------------------------------

async fn record_and_reply(
    State(db): State<Db>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let recorded = RecordedRequest {
        id: Uuid::new_v4(),
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: headers
            .iter()
            .map(|(n, v)| (n.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect(),
        body: body.to_vec(),
    };
    debug!(id = %recorded.id, method = %recorded.method, path = %recorded.path, "recorded request");
    db.requests.write().await.push(recorded);

    let canned = db.responses.read().await.get(uri.path()).cloned();
    let Some(canned) = canned else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if canned.delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(canned.delay_ms)).await;
    }
    into_response(canned)
}

fn into_response(canned: CannedResponse) -> Response {
    let status = StatusCode::from_u16(canned.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut headers = HeaderMap::new();
    for (name, value) in &canned.headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %name, "skipping invalid canned header"),
        }
    }
    let body = if canned.chunk_size == 0 {
        Body::from(canned.body)
    } else {
        chunked_body(canned.body, canned.chunk_size, canned.chunk_interval_ms)
    };
    (status, headers, body).into_response()
}

fn chunked_body(body: Vec<u8>, chunk_size: usize, interval_ms: u64) -> Body {
    let chunks: Vec<Bytes> = body
        .chunks(chunk_size)
        .map(Bytes::copy_from_slice)
        .collect();
    let interval = Duration::from_millis(interval_ms);
    let stream = stream::iter(chunks.into_iter().enumerate()).then(move |(index, chunk)| async move {
        if index > 0 {
            tokio::time::sleep(interval).await;
        }
        Ok::<_, std::io::Error>(chunk)
    });
    Body::from_stream(stream)
}

// ---------------------------------------------------------------------------
// In-process server
// ---------------------------------------------------------------------------

/// A server on an ephemeral local port, stopped on drop.
pub struct MockServer {
    addr: SocketAddr,
    db: Db,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let db = Db::default();
        let router = app_with_state(db.clone());
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!(error = %e, "mock server stopped");
            }
        });
        info!(%addr, "mock server started");
        Ok(Self { addr, db, handle })
    }

    /// `http://127.0.0.1:{port}`
    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.uri())
    }

    pub async fn respond(&self, path: &str, response: CannedResponse) {
        self.db.respond(path, response).await;
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.db.requests().await
    }

    pub async fn clear(&self) {
        self.db.clear().await;
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
