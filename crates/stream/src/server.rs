//! HTTP server implementing the durable streams protocol.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{sse::Event, IntoResponse, Response, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use tokio::{sync::broadcast::error::RecvError, time::timeout};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::{
    store::{StoreError, StreamStore},
    types::{parse_offset, Offset, ReadResult, ServerOptions, StreamConfig, WireRecord},
};

/// Header carrying the offset the next read should start from.
pub const NEXT_OFFSET_HEADER: &str = "Stream-Next-Offset";
/// Header carrying the oldest retained offset.
pub const EARLIEST_OFFSET_HEADER: &str = "Stream-Earliest-Offset";
/// Header carrying the offset assigned by an append.
pub const OFFSET_HEADER: &str = "Stream-Offset";
/// Header set on reads that reached the tail.
pub const UP_TO_DATE_HEADER: &str = "Stream-Up-To-Date";
/// Header overriding retention on create.
pub const MAX_RECORDS_HEADER: &str = "Stream-Max-Records";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StreamStore>,
    pub options: ServerOptions,
}

/// Query parameters for GET requests.
#[derive(Debug, Deserialize)]
pub struct ReadQuery {
    pub offset: Option<String>,
    pub live: Option<String>,
}

/// Create the router with all stream endpoints.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .expose_headers(Any);

    // HEAD requests are answered by the explicit head handler; axum only
    // falls back to GET when no HEAD route exists.
    Router::new()
        .route(
            "/{*path}",
            get(handle_read)
                .head(handle_head)
                .put(handle_create)
                .post(handle_append)
                .delete(handle_delete),
        )
        .layer(cors)
        .with_state(state)
}

/// PUT - Create a new stream
async fn handle_create(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    let path = format!("/{}", path);
    debug!(path = %path, "Creating stream");

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let max_records = headers
        .get(MAX_RECORDS_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());

    let config = StreamConfig {
        content_type: content_type.clone(),
        max_records,
    };

    match state.store.create(&path, config) {
        Ok(created) => {
            let next_offset = state.store.next_offset(&path).unwrap_or_default();

            let mut response = Response::builder()
                .status(if created {
                    StatusCode::CREATED
                } else {
                    StatusCode::OK
                })
                .header(NEXT_OFFSET_HEADER, next_offset.to_string())
                .header(header::LOCATION, &path);

            if let Some(ct) = content_type {
                response = response.header(header::CONTENT_TYPE, ct);
            }

            build(response, Body::empty())
        }
        Err(StoreError::ConfigMismatch) => (
            StatusCode::CONFLICT,
            "Stream already exists with different configuration",
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to create stream");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// HEAD - Get stream metadata
async fn handle_head(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let path = format!("/{}", path);

    let Some(stream) = state.store.get(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(NEXT_OFFSET_HEADER, stream.next_offset.to_string())
        .header(EARLIEST_OFFSET_HEADER, stream.earliest_offset().to_string());

    if let Some(ct) = &stream.content_type {
        response = response.header(header::CONTENT_TYPE, ct.as_str());
    }

    build(response, Body::empty())
}

/// GET - Read from stream (catch-up, long-poll, or SSE)
async fn handle_read(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Response {
    let path = format!("/{}", path);

    if !state.store.has(&path) {
        return StatusCode::NOT_FOUND.into_response();
    }

    let raw_offset = query.offset.as_deref().unwrap_or("-1");
    let Some(offset) = parse_offset(raw_offset) else {
        return (
            StatusCode::BAD_REQUEST,
            StoreError::InvalidOffset(raw_offset.to_string()).to_string(),
        )
            .into_response();
    };

    match query.live.as_deref() {
        Some("sse") => handle_sse(state, path, offset),
        Some("long-poll") => handle_long_poll(state, path, offset).await,
        _ => handle_catch_up(&state, &path, offset),
    }
}

/// Handle catch-up read (immediate response)
fn handle_catch_up(state: &AppState, path: &str, offset: Offset) -> Response {
    match state.store.read(path, offset) {
        Ok(result) => records_response(path, offset, &result),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// Handle long-poll read (wait for new data)
async fn handle_long_poll(state: AppState, path: String, offset: Offset) -> Response {
    // Subscribe before reading so an append between the two is not missed
    let mut rx = state.store.subscribe();

    let result = match state.store.read(&path, offset) {
        Ok(r) => r,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    if !result.records.is_empty() {
        return records_response(&path, offset, &result);
    }

    let timeout_duration = Duration::from_millis(state.options.long_poll_timeout_ms);
    let woke = timeout(timeout_duration, async {
        loop {
            match rx.recv().await {
                Ok(notification) if notification.path == path => return true,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return false,
            }
        }
    })
    .await;

    if let Ok(true) = woke {
        match state.store.read(&path, offset) {
            Ok(result) => return records_response(&path, offset, &result),
            Err(e) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
            }
        }
    }

    let next_offset = state.store.next_offset(&path).unwrap_or(offset);
    build(
        Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header(NEXT_OFFSET_HEADER, next_offset.to_string())
            .header(UP_TO_DATE_HEADER, "true"),
        Body::empty(),
    )
}

/// Handle SSE streaming
fn handle_sse(state: AppState, path: String, offset: Offset) -> Response {
    info!(path = %path, offset, "SSE reader connected");
    Sse::new(create_sse_stream(state, path, offset))
        .keep_alive(
            axum::response::sse::KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response()
}

/// Every record becomes an `event: data` frame whose id is the record offset.
fn create_sse_stream(
    state: AppState,
    path: String,
    mut offset: Offset,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let mut rx = state.store.subscribe();

        loop {
            let result = match state.store.read(&path, offset) {
                Ok(result) => result,
                Err(e) => {
                    info!(path = %path, error = %e, "Ending SSE stream");
                    break;
                }
            };

            for record in &result.records {
                let wire = WireRecord::from(record);
                yield Ok(Event::default()
                    .event("data")
                    .id(record.offset.to_string())
                    .data(wire.data));
            }
            offset = result.next_offset;

            let timeout_duration = Duration::from_millis(state.options.long_poll_timeout_ms);
            match timeout(timeout_duration, rx.recv()).await {
                // Re-read on any wake-up; lagging only means we skipped notifications
                Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => continue,
                Ok(Err(RecvError::Closed)) => break,
                Err(_) => {
                    let control = serde_json::json!({
                        "streamNextOffset": offset,
                        "upToDate": true
                    });
                    yield Ok(Event::default().event("control").data(control.to_string()));
                }
            }
        }
    }
}

/// POST - Append one record to a stream
async fn handle_append(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = format!("/{}", path);

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "Failed to read body").into_response();
        }
    };

    match state.store.append(&path, body_bytes, content_type) {
        Ok(offset) => build(
            Response::builder()
                .status(StatusCode::OK)
                .header(OFFSET_HEADER, offset.to_string())
                .header(NEXT_OFFSET_HEADER, (offset + 1).to_string()),
            Body::empty(),
        ),
        Err(StoreError::NotFound(p)) => {
            (StatusCode::NOT_FOUND, format!("Stream not found: {}", p)).into_response()
        }
        Err(e @ StoreError::ContentTypeMismatch { .. }) => {
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
        Err(StoreError::EmptyBody) => {
            (StatusCode::BAD_REQUEST, "Empty body not allowed").into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to append to stream");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// DELETE - Delete a stream
async fn handle_delete(State(state): State<AppState>, Path(path): Path<String>) -> StatusCode {
    let path = format!("/{}", path);

    if state.store.delete(&path) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

fn records_response(path: &str, start: Offset, result: &ReadResult) -> Response {
    let wire: Vec<WireRecord> = result.records.iter().map(WireRecord::from).collect();
    let body = match serde_json::to_vec(&wire) {
        Ok(body) => body,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    build(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .header(NEXT_OFFSET_HEADER, result.next_offset.to_string())
            .header(UP_TO_DATE_HEADER, result.up_to_date.to_string())
            .header(header::ETAG, generate_etag(path, start, result.next_offset)),
        Body::from(body),
    )
}

fn build(builder: axum::http::response::Builder, body: Body) -> Response {
    builder
        .body(body)
        .unwrap_or_else(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())
}

/// Generate an ETag for a read response.
fn generate_etag(path: &str, start_offset: Offset, end_offset: Offset) -> String {
    use base64::Engine;
    let path_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(path);
    format!("\"{}:{}:{}\"", path_b64, start_offset, end_offset)
}

/// Start the server.
pub async fn start_server(options: ServerOptions) -> std::io::Result<()> {
    let state = AppState {
        store: StreamStore::with_retention(options.max_records),
        options: options.clone(),
    };

    let router = create_router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting durable streams server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;

    fn create_test_app() -> (Router, Arc<StreamStore>) {
        let store = StreamStore::new();
        let state = AppState {
            store: store.clone(),
            options: ServerOptions {
                long_poll_timeout_ms: 50,
                ..ServerOptions::default()
            },
        };
        (create_router(state), store)
    }

    fn request(method: &str, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_stream() {
        let (app, _) = create_test_app();

        let response = app
            .oneshot(request("PUT", "/test/stream", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["stream-next-offset"], "0");
    }

    #[tokio::test]
    async fn test_create_idempotent() {
        let (app, _) = create_test_app();

        let response = app
            .clone()
            .oneshot(request("PUT", "/test/stream", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(request("PUT", "/test/stream", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_append_and_read() {
        let (app, _) = create_test_app();

        app.clone()
            .oneshot(request("PUT", "/test/stream", Body::empty()))
            .await
            .unwrap();

        for body in ["hello", "world"] {
            let response = app
                .clone()
                .oneshot(request("POST", "/test/stream", Body::from(body)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(request("GET", "/test/stream?offset=-1", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["stream-next-offset"], "2");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let records: Vec<WireRecord> = serde_json::from_slice(&body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 0);
        assert_eq!(records[0].decode().unwrap(), b"hello");
        assert_eq!(records[1].decode().unwrap(), b"world");
    }

    #[tokio::test]
    async fn test_append_returns_offset() {
        let (app, store) = create_test_app();
        store.create("/log", StreamConfig::default()).unwrap();
        store.append("/log", b"first".to_vec(), None).unwrap();

        let response = app
            .oneshot(request("POST", "/log", Body::from("second")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["stream-offset"], "1");
        assert_eq!(response.headers()["stream-next-offset"], "2");
    }

    #[tokio::test]
    async fn test_head_reports_offsets() {
        let (app, store) = create_test_app();
        store.create("/log", StreamConfig::default()).unwrap();
        store.append("/log", b"x".to_vec(), None).unwrap();

        let response = app
            .oneshot(request("HEAD", "/log", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["stream-next-offset"], "1");
        assert_eq!(response.headers()["stream-earliest-offset"], "0");
    }

    #[tokio::test]
    async fn test_invalid_offset() {
        let (app, store) = create_test_app();
        store.create("/log", StreamConfig::default()).unwrap();

        let response = app
            .oneshot(request("GET", "/log?offset=abc", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_long_poll_times_out_without_data() {
        let (app, store) = create_test_app();
        store.create("/log", StreamConfig::default()).unwrap();

        let response = app
            .oneshot(request("GET", "/log?offset=0&live=long-poll", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["stream-up-to-date"], "true");
    }

    #[tokio::test]
    async fn test_long_poll_wakes_on_append() {
        let (app, store) = create_test_app();
        store.create("/log", StreamConfig::default()).unwrap();

        let writer = Arc::clone(&store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.append("/log", b"late".to_vec(), None).unwrap();
        });

        let response = app
            .oneshot(request("GET", "/log?offset=0&live=long-poll", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_delete_stream() {
        let (app, store) = create_test_app();
        store.create("/test/stream", StreamConfig::default()).unwrap();

        let response = app
            .clone()
            .oneshot(request("DELETE", "/test/stream", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request("GET", "/test/stream?offset=-1", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
