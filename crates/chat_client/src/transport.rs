use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use wire_protocol::headers::{RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, RETRY_AFTER};
use wire_protocol::{ChatRequest, Message};

use crate::cancel::{await_or_cancel, CancelSignal};
use crate::config::ClientConfig;
use crate::error::{parse_error_message, ClientError};

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

/// Quota state advertised by the server on a chat response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaSnapshot {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// RFC 3339 timestamp, passed through as sent.
    pub reset_at: Option<String>,
}

impl QuotaSnapshot {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let snapshot = Self {
            limit: header_str(headers, RATE_LIMIT_LIMIT).and_then(|value| value.parse().ok()),
            remaining: header_str(headers, RATE_LIMIT_REMAINING)
                .and_then(|value| value.parse().ok()),
            reset_at: header_str(headers, RATE_LIMIT_RESET).map(str::to_string),
        };

        if snapshot == Self::default() {
            None
        } else {
            Some(snapshot)
        }
    }
}

/// An accepted chat turn whose body is still streaming.
pub struct ChatResponse {
    pub quota: Option<QuotaSnapshot>,
    pub body: BodyStream,
}

impl std::fmt::Debug for ChatResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatResponse")
            .field("quota", &self.quota)
            .finish_non_exhaustive()
    }
}

/// Opens chat streams and loads stored history.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Submits one turn. Non-2xx statuses become errors before any body is read.
    async fn open(
        &self,
        request: &ChatRequest,
        token: &str,
        cancel: &CancelSignal,
    ) -> Result<ChatResponse, ClientError>;

    async fn history(&self, session_id: &str, token: &str) -> Result<Vec<Message>, ClientError>;
}

#[derive(Debug, Deserialize)]
struct HistoryPayload {
    #[serde(default)]
    messages: Vec<Message>,
}

/// [`ChatTransport`] over HTTP.
#[derive(Debug)]
pub struct HttpTransport {
    http: Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        // Validate up front so a bad origin fails at construction.
        config.chat_url()?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().map_err(ClientError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn build_headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &self.config.extra_headers {
            headers.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ClientError::InvalidBaseUrl(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(value).map_err(|_| {
                    ClientError::InvalidBaseUrl(format!("invalid header value for {key}"))
                })?,
            );
        }
        if let Some(user_agent) = self.config.user_agent.as_deref() {
            headers.insert(
                USER_AGENT,
                HeaderValue::from_str(user_agent)
                    .map_err(|_| ClientError::InvalidBaseUrl("invalid user agent".to_string()))?,
            );
        }
        Ok(headers)
    }

    pub fn build_request(
        &self,
        request: &ChatRequest,
        token: &str,
    ) -> Result<reqwest::RequestBuilder, ClientError> {
        Ok(self
            .http
            .post(self.config.chat_url()?)
            .headers(self.build_headers()?)
            .header(ACCEPT, "text/plain")
            .bearer_auth(token)
            .json(request))
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(
        &self,
        request: &ChatRequest,
        token: &str,
        cancel: &CancelSignal,
    ) -> Result<ChatResponse, ClientError> {
        let pending = self.build_request(request, token)?.send();
        let response = await_or_cancel(pending, cancel).await??;

        let status = response.status();
        if !status.is_success() {
            return Err(await_or_cancel(status_error(response), cancel).await?);
        }

        let quota = QuotaSnapshot::from_headers(response.headers());
        tracing::debug!(?quota, "chat stream opened");
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from));

        Ok(ChatResponse {
            quota,
            body: Box::pin(body),
        })
    }

    async fn history(&self, session_id: &str, token: &str) -> Result<Vec<Message>, ClientError> {
        let response = self
            .http
            .get(self.config.history_url(session_id)?)
            .headers(self.build_headers()?)
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let payload: HistoryPayload = response.json().await?;
        Ok(payload.messages)
    }
}

/// Converts a non-2xx response into the matching error, reading its body for the message.
pub async fn status_error(response: Response) -> ClientError {
    let status = response.status();
    let headers = response.headers().clone();
    let body = match response.text().await {
        Ok(body) => body,
        Err(error) => {
            tracing::debug!(%status, %error, "failed to read error response body");
            String::new()
        }
    };
    error_for_status(status, &headers, &body)
}

pub fn error_for_status(status: StatusCode, headers: &HeaderMap, body: &str) -> ClientError {
    let message = parse_error_message(status, body);
    if status == StatusCode::TOO_MANY_REQUESTS {
        return ClientError::RateLimited {
            message,
            retry_after: header_str(headers, RETRY_AFTER)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
            reset_at: header_str(headers, RATE_LIMIT_RESET).map(str::to_string),
        };
    }

    ClientError::Status { status, message }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (key, value) in pairs {
            map.insert(*key, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited() {
        let error = error_for_status(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[
                ("retry-after", "40"),
                ("x-ratelimit-reset", "2026-01-01T00:01:00Z"),
            ]),
            "Too Many Requests - Please wait before trying again",
        );

        assert_matches!(
            error,
            ClientError::RateLimited { message, retry_after, reset_at } => {
                assert_eq!(message, "Too Many Requests - Please wait before trying again");
                assert_eq!(retry_after, Some(Duration::from_secs(40)));
                assert_eq!(reset_at.as_deref(), Some("2026-01-01T00:01:00Z"));
            }
        );
    }

    #[test]
    fn other_statuses_keep_server_message() {
        let error = error_for_status(
            StatusCode::BAD_REQUEST,
            &HeaderMap::new(),
            r#"{"error":"sessionId is required"}"#,
        );
        assert_matches!(
            error,
            ClientError::Status { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "sessionId is required");
            }
        );
    }

    #[tokio::test]
    async fn unreadable_error_body_falls_back_to_status_reason() {
        let body = reqwest::Body::wrap_stream(futures_util::stream::once(async {
            Err::<Bytes, std::io::Error>(std::io::Error::other("connection reset"))
        }));
        let response = Response::from(
            http::Response::builder()
                .status(502)
                .body(body)
                .expect("response"),
        );

        assert_matches!(
            status_error(response).await,
            ClientError::Status { status, message } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(message, "Bad Gateway");
            }
        );
    }

    #[test]
    fn quota_snapshot_reads_headers() {
        let snapshot = QuotaSnapshot::from_headers(&headers(&[
            ("x-ratelimit-limit", "20"),
            ("x-ratelimit-remaining", "19"),
            ("x-ratelimit-reset", "2026-01-01T00:01:00Z"),
        ]))
        .expect("snapshot");
        assert_eq!(snapshot.limit, Some(20));
        assert_eq!(snapshot.remaining, Some(19));
        assert_eq!(snapshot.reset_at.as_deref(), Some("2026-01-01T00:01:00Z"));

        assert_eq!(QuotaSnapshot::from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn request_carries_bearer_and_json_body() {
        let transport = HttpTransport::new(
            ClientConfig::new("http://localhost:3000").insert_header("x-client", "tests"),
        )
        .expect("transport");
        let request = transport
            .build_request(&ChatRequest::new("s1", Vec::new()), "secret")
            .expect("builder")
            .build()
            .expect("request");

        assert_eq!(request.url().as_str(), "http://localhost:3000/api/chat");
        assert_eq!(request.method(), "POST");
        assert_eq!(
            request.headers().get("authorization").and_then(|v| v.to_str().ok()),
            Some("Bearer secret")
        );
        assert_eq!(
            request.headers().get("x-client").and_then(|v| v.to_str().ok()),
            Some("tests")
        );
    }
}
