use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Url;

use crate::error::ClientError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
pub const CHAT_PATH: &str = "api/chat";
pub const HISTORY_PATH: &str = "api/chat/history";

/// Transport configuration for chat requests.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server origin, with or without a trailing slash.
    pub base_url: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into every request.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional timeout for establishing a request. Streaming bodies are not bounded by it.
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: None,
            extra_headers: BTreeMap::new(),
            connect_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn chat_url(&self) -> Result<Url, ClientError> {
        self.endpoint(CHAT_PATH)
    }

    pub fn history_url(&self, session_id: &str) -> Result<Url, ClientError> {
        let mut url = self.endpoint(HISTORY_PATH)?;
        url.query_pairs_mut().append_pair("sessionId", session_id);
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let trimmed = self.base_url.trim();
        if trimmed.is_empty() {
            return Err(ClientError::InvalidBaseUrl("base URL is empty".to_string()));
        }

        let base = if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        let base = Url::parse(&base)
            .map_err(|error| ClientError::InvalidBaseUrl(format!("{trimmed}: {error}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl(format!(
                "unsupported scheme: {}",
                base.scheme()
            )));
        }

        base.join(path)
            .map_err(|error| ClientError::InvalidBaseUrl(format!("{trimmed}: {error}")))
    }
}
