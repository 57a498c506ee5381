use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use wire_protocol::{headers, ChatRequest};

use crate::error::{insert_quota_headers, GateError};
use crate::gate::{client_identity, ChatGate};
use crate::multiplexer::ChannelSink;

/// Frames buffered between the multiplexer task and the response body.
pub const DEFAULT_FRAME_BUFFER: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<ChatGate>,
    pub frame_buffer: usize,
}

impl AppState {
    #[must_use]
    pub fn new(gate: ChatGate) -> Self {
        Self {
            gate: Arc::new(gate),
            frame_buffer: DEFAULT_FRAME_BUFFER,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/history", get(history))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn chat(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    request_headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GateError> {
    let identity = client_identity(&request_headers, peer.map(|ConnectInfo(addr)| addr));
    let decision = state.gate.check_quota(&identity).await?;
    state.gate.authorize(authorization(&request_headers))?;

    let request = parse_chat_request(&body)?;
    let turn = state.gate.prepare(&identity, request).await?;

    let (tx, rx) = mpsc::channel(state.frame_buffer.max(1));
    let gate = Arc::clone(&state.gate);
    tokio::spawn(async move {
        let mut sink = ChannelSink::new(tx);
        gate.run_turn(turn, &mut sink).await;
    });

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    let response_headers = response.headers_mut();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response_headers.insert(
        headers::DATA_STREAM,
        HeaderValue::from_static(headers::DATA_STREAM_VERSION),
    );
    insert_quota_headers(response_headers, &decision);
    Ok(response)
}

fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, GateError> {
    serde_json::from_slice::<ChatRequest>(body).map_err(|error| GateError::InvalidBody(error.to_string()))
}

fn authorization(request_headers: &HeaderMap) -> Option<&str> {
    request_headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryParams {
    session_id: Option<String>,
}

async fn history(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    Query(params): Query<HistoryParams>,
) -> Result<Response, GateError> {
    state.gate.authorize(authorization(&request_headers))?;
    let session_id = params.session_id.as_deref();
    let messages = state.gate.history(session_id).await?;
    Ok(Json(serde_json::json!({
        "messages": messages,
        "sessionId": session_id.map(str::trim),
    }))
    .into_response())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Periodically drops expired quota windows so idle identities do not accumulate.
pub fn spawn_quota_janitor(gate: Arc<ChatGate>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = gate.quota_store().purge_expired(gate.clock().now()).await;
            if removed > 0 {
                tracing::debug!(removed, "purged expired quota windows");
            }
        }
    })
}
