//! Admission control and best-effort transcript persistence around the multiplexer.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use agent_provider::{
    ModelProvider, ModelRequest, ProviderProfile, DATA_LOOKUP_TOOL, IMAGE_GENERATION_TOOL,
};
use axum::http::HeaderMap;
use session_store::{validate_session_id, MessageStore};
use tokio::task::JoinHandle;
use wire_protocol::{ChatRequest, Message, Role, ToolCallRecord};

use crate::auth::{bearer_token, AllowAnonymous, TokenVerifier};
use crate::error::GateError;
use crate::multiplexer::{FrameSink, Multiplexer, TurnSummary};
use crate::quota::{
    chat_key, Clock, IdentityToolQuota, InMemoryQuotaStore, QuotaDecision, QuotaPolicy,
    QuotaStore, SystemClock,
};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const DEFAULT_HISTORY_PAGE_LIMIT: usize = 50;
pub const FALLBACK_IDENTITY: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct GateSettings {
    pub chat_policy: QuotaPolicy,
    /// Sub-quotas for generation-class tools, keyed by tool name.
    pub tool_policies: HashMap<String, QuotaPolicy>,
    /// Turns of history seeded into the model context.
    pub history_limit: usize,
    /// Turns returned by the history endpoint.
    pub history_page_limit: usize,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            chat_policy: QuotaPolicy::chat(),
            tool_policies: HashMap::from([
                (IMAGE_GENERATION_TOOL.to_string(), QuotaPolicy::tool()),
                (DATA_LOOKUP_TOOL.to_string(), QuotaPolicy::tool()),
            ]),
            history_limit: DEFAULT_HISTORY_LIMIT,
            history_page_limit: DEFAULT_HISTORY_PAGE_LIMIT,
        }
    }
}

/// A turn that passed admission and is ready to stream.
#[derive(Debug)]
pub struct PreparedTurn {
    pub session_id: String,
    pub model_request: ModelRequest,
    /// Fire-and-forget write of the user's turn.
    pub user_persisted: JoinHandle<()>,
}

#[derive(Debug)]
pub struct TurnReport {
    pub summary: TurnSummary,
    /// Completes once every write for this turn has been attempted.
    pub persistence: JoinHandle<()>,
}

pub struct ChatGate {
    provider: Arc<dyn ModelProvider>,
    store: Arc<dyn MessageStore>,
    quota: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn TokenVerifier>,
    multiplexer: Multiplexer,
    settings: GateSettings,
    tool_policies: Arc<HashMap<String, QuotaPolicy>>,
}

impl ChatGate {
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProvider>, store: Arc<dyn MessageStore>) -> Self {
        let settings = GateSettings::default();
        Self {
            provider,
            store,
            quota: Arc::new(InMemoryQuotaStore::new()),
            clock: Arc::new(SystemClock),
            verifier: Arc::new(AllowAnonymous),
            multiplexer: Multiplexer::default(),
            tool_policies: Arc::new(settings.tool_policies.clone()),
            settings,
        }
    }

    #[must_use]
    pub fn with_quota_store(mut self, quota: Arc<dyn QuotaStore>) -> Self {
        self.quota = quota;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    #[must_use]
    pub fn with_multiplexer(mut self, multiplexer: Multiplexer) -> Self {
        self.multiplexer = multiplexer;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: GateSettings) -> Self {
        self.tool_policies = Arc::new(settings.tool_policies.clone());
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn provider_profile(&self) -> ProviderProfile {
        self.provider.profile()
    }

    #[must_use]
    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    #[must_use]
    pub fn quota_store(&self) -> Arc<dyn QuotaStore> {
        Arc::clone(&self.quota)
    }

    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Counts one chat request for `identity`; denial maps to a 429.
    pub async fn check_quota(&self, identity: &str) -> Result<QuotaDecision, GateError> {
        let now = self.clock.now();
        let decision = self
            .quota
            .hit(&chat_key(identity), self.settings.chat_policy, now)
            .await;

        if !decision.allowed {
            let retry_after_secs = decision.retry_after_secs(now);
            tracing::warn!(identity, retry_after_secs, "chat quota exhausted");
            return Err(GateError::RateLimited {
                decision,
                retry_after_secs,
            });
        }

        tracing::debug!(identity, remaining = decision.remaining, "chat request admitted");
        Ok(decision)
    }

    /// Checks the `Authorization` header value against the configured verifier.
    pub fn authorize(&self, authorization: Option<&str>) -> Result<(), GateError> {
        if !self.verifier.required() {
            return Ok(());
        }

        match authorization.and_then(bearer_token) {
            Some(token) if self.verifier.verify(token) => Ok(()),
            _ => Err(GateError::Unauthorized),
        }
    }

    /// Validates the request, seeds history, and starts persisting the user turn.
    pub async fn prepare(
        &self,
        identity: &str,
        request: ChatRequest,
    ) -> Result<PreparedTurn, GateError> {
        let session_id = request
            .session_id()
            .ok_or(GateError::MissingSessionId)?
            .to_string();
        validate_session_id(&session_id)
            .map_err(|error| GateError::InvalidSessionId(error.to_string()))?;
        let user_text = user_turn_text(&request).ok_or(GateError::MissingUserTurn)?;
        let user_message_id = request
            .messages
            .last()
            .map(|message| message.id().to_string())
            .unwrap_or_default();

        if let Err(error) = self.store.ensure_session(&session_id).await {
            tracing::warn!(%session_id, %error, "failed to ensure session; continuing");
        }

        let history = match self
            .store
            .get(&session_id, self.settings.history_limit)
            .await
        {
            Ok(history) => history,
            Err(error) => {
                tracing::warn!(%session_id, %error, "failed to load history; continuing without it");
                Vec::new()
            }
        };
        tracing::info!(%session_id, identity, history = history.len(), "starting chat turn");

        let user_persisted = spawn_append(
            Arc::clone(&self.store),
            session_id.clone(),
            Role::User,
            user_text.clone(),
            Vec::new(),
            None,
        );

        let mut messages: Vec<Message> = history.iter().map(|stored| stored.to_message()).collect();
        messages.push(Message::user(user_message_id, user_text));

        let model_request = ModelRequest {
            session_id: session_id.clone(),
            identity: identity.to_string(),
            messages,
            images: request.images.clone().unwrap_or_default(),
            tool_quota: Arc::new(IdentityToolQuota::new(
                Arc::clone(&self.quota),
                Arc::clone(&self.clock),
                identity,
                Arc::clone(&self.tool_policies),
            )),
        };

        Ok(PreparedTurn {
            session_id,
            model_request,
            user_persisted,
        })
    }

    /// Streams the model turn into `sink` and schedules the assistant write.
    ///
    /// The assistant turn is persisted only when the model completed; it is
    /// written after the user turn's write has settled.
    pub async fn run_turn(&self, turn: PreparedTurn, sink: &mut dyn FrameSink) -> TurnReport {
        let PreparedTurn {
            session_id,
            model_request,
            user_persisted,
        } = turn;

        let profile = self.provider.profile();
        tracing::debug!(
            %session_id,
            provider = %profile.provider_id,
            model = %profile.model_id,
            "streaming model turn"
        );
        let events = self.provider.stream(model_request);
        let summary = self.multiplexer.run(events, sink).await;

        let has_content = !summary.text.is_empty() || !summary.tool_calls.is_empty();
        let persistence = if summary.is_completed() && has_content {
            spawn_append(
                Arc::clone(&self.store),
                session_id.clone(),
                Role::Assistant,
                summary.text.clone(),
                summary.tool_calls.clone(),
                Some(user_persisted),
            )
        } else {
            tracing::debug!(%session_id, outcome = ?summary.outcome, "assistant turn not persisted");
            user_persisted
        };

        tracing::info!(
            %session_id,
            chars = summary.text.len(),
            tool_calls = summary.tool_calls.len(),
            client_disconnected = summary.client_disconnected,
            "chat turn finished"
        );

        TurnReport {
            summary,
            persistence,
        }
    }

    /// Most recent turns of a session for the client to seed its transcript.
    pub async fn history(&self, session_id: Option<&str>) -> Result<Vec<Message>, GateError> {
        let session_id = session_id
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(GateError::MissingSessionId)?;
        validate_session_id(session_id)
            .map_err(|error| GateError::InvalidSessionId(error.to_string()))?;

        let stored = self
            .store
            .get(session_id, self.settings.history_page_limit)
            .await
            .map_err(|error| {
                tracing::error!(session_id, %error, "failed to load history");
                GateError::Internal("Failed to load history".to_string())
            })?;
        Ok(stored.iter().map(|message| message.to_message()).collect())
    }
}

/// The latest user text with markers for attached images.
pub fn user_turn_text(request: &ChatRequest) -> Option<String> {
    let text = request.latest_user_text()?;
    let has_images = request.first_image_url().is_some() || request.has_inline_images();
    if text.trim().is_empty() && !has_images {
        return None;
    }

    let mut text = text.to_string();
    if let Some(url) = request.first_image_url() {
        text.push_str(&format!(" [Image attached: {url}]"));
    } else if request.has_inline_images() {
        text.push_str(" [Image attached]");
    }
    Some(text)
}

/// First `X-Forwarded-For` hop, else the peer address, else loopback.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| FALLBACK_IDENTITY.to_string())
}

fn spawn_append(
    store: Arc<dyn MessageStore>,
    session_id: String,
    role: Role,
    text: String,
    tool_calls: Vec<ToolCallRecord>,
    after: Option<JoinHandle<()>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Some(previous) = after {
            if let Err(error) = previous.await {
                tracing::warn!(%session_id, %error, "previous persistence task aborted");
            }
        }

        if let Err(error) = store.append(&session_id, role, &text, tool_calls).await {
            tracing::error!(%session_id, role = role.as_str(), %error, "failed to persist turn");
        }
    })
}
