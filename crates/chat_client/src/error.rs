use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("a request is already in flight")]
    Busy,

    #[error("message is empty")]
    EmptyInput,

    #[error("no credential available")]
    MissingCredential,

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
        /// RFC 3339 timestamp at which the window reopens, as sent by the server.
        reset_at: Option<String>,
    },

    #[error("HTTP {status} {message}")]
    Status { status: StatusCode, message: String },

    #[error("stream read failed: {0}")]
    Stream(String),

    #[error("{0}")]
    Server(String),

    #[error("request was cancelled")]
    Cancelled,
}

impl ClientError {
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<String>,
}

/// Best human-readable message for a non-2xx response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(ErrorPayload {
        error: Some(message),
    }) = serde_json::from_str::<ErrorPayload>(body)
    {
        if !message.trim().is_empty() {
            return message;
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_json_error_field() {
        assert_eq!(
            parse_error_message(StatusCode::BAD_REQUEST, r#"{"error":"sessionId is required"}"#),
            "sessionId is required"
        );
    }

    #[test]
    fn falls_back_to_body_then_reason() {
        assert_eq!(
            parse_error_message(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            "slow down"
        );
        assert_eq!(
            parse_error_message(StatusCode::BAD_GATEWAY, ""),
            "Bad Gateway"
        );
    }
}
