use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use wire_protocol::headers;

use crate::quota::QuotaDecision;

pub const RATE_LIMITED_BODY: &str = "Too Many Requests - Please wait before trying again";

#[derive(Debug, Error)]
pub enum GateError {
    #[error("rate limit exceeded; retry in {retry_after_secs}s")]
    RateLimited {
        decision: QuotaDecision,
        retry_after_secs: u64,
    },

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("sessionId is required")]
    MissingSessionId,

    #[error("invalid sessionId: {0}")]
    InvalidSessionId(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("the last message must be a non-empty user turn")]
    MissingUserTurn,

    #[error("{0}")]
    Internal(String),
}

impl GateError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MissingSessionId
            | Self::InvalidSessionId(_)
            | Self::InvalidBody(_)
            | Self::MissingUserTurn => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::RateLimited {
                decision,
                retry_after_secs,
            } => {
                let mut response = (status, RATE_LIMITED_BODY).into_response();
                insert_quota_headers(response.headers_mut(), &decision);
                response.headers_mut().insert(
                    headers::RETRY_AFTER,
                    HeaderValue::from(retry_after_secs),
                );
                response
            }
            other => {
                let mut response = Json(serde_json::json!({ "error": other.to_string() })).into_response();
                *response.status_mut() = status;
                if status == StatusCode::UNAUTHORIZED {
                    response
                        .headers_mut()
                        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                }
                response
            }
        }
    }
}

/// Writes the limit/remaining/reset triple describing the current window.
pub fn insert_quota_headers(target: &mut axum::http::HeaderMap, decision: &QuotaDecision) {
    target.insert(headers::RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    target.insert(
        headers::RATE_LIMIT_REMAINING,
        HeaderValue::from(decision.remaining),
    );
    if let Some(reset) = decision
        .reset_at
        .format(&Rfc3339)
        .ok()
        .and_then(|value| HeaderValue::from_str(&value).ok())
    {
        target.insert(headers::RATE_LIMIT_RESET, reset);
    }
}
