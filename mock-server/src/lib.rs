use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use uuid::Uuid;

/// Header `/echo` takes its request id from; a fresh id is assigned when it
/// is missing or not a UUID.
pub const REQUEST_ID: &str = "x-request-id";

/// What `/echo` reports back about the request it received.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub request_id: Uuid,
    pub method: String,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Count {
    pub count: u64,
}

pub type Hits = Arc<AtomicU64>;

pub fn app() -> Router {
    let hits: Hits = Arc::new(AtomicU64::new(0));
    Router::new()
        .route("/json", get(json))
        .route("/text", get(text))
        .route("/form", get(form))
        .route("/bytes", get(bytes))
        .route("/status/{code}", get(status))
        .route("/delay/{ms}", get(delay))
        .route("/echo", any(echo))
        .route("/counter", get(counter))
        .with_state(hits)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn json() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "hello" }))
}

async fn text() -> &'static str {
    "hello"
}

async fn form() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/x-www-form-urlencoded")],
        "name=fetch&kind=mock+server",
    )
}

async fn bytes() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        vec![0u8, 1, 2, 3],
    )
}

async fn status(Path(code): Path<u16>) -> Result<impl IntoResponse, StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, Json(serde_json::json!({ "status": code }))))
}

async fn delay(Path(ms): Path<u64>) -> Json<serde_json::Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(serde_json::json!({ "delayed": ms }))
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let mut pairs: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-"))
        .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or("").to_string()))
        .collect();
    pairs.sort();
    let request_id = headers
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .unwrap_or_else(Uuid::new_v4);
    tracing::debug!(%request_id, %method, "echo");
    Json(Echo {
        request_id,
        method: method.to_string(),
        content_type,
        headers: pairs,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn counter(State(hits): State<Hits>) -> Json<Count> {
    let count = hits.fetch_add(1, Ordering::SeqCst) + 1;
    Json(Count { count })
}
