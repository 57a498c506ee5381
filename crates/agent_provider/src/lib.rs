//! Provider-agnostic contract for the upstream language-model call.
//!
//! The server never talks to a model directly. It hands a [`ModelRequest`] to a
//! [`ModelProvider`] and consumes the heterogeneous [`ModelEvent`] stream it
//! returns. Tool execution happens on the provider side; the server only sees
//! the resulting call/result events.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;
use wire_protocol::Message;

/// Tool that answers data-lookup questions (market price quotes).
pub const DATA_LOOKUP_TOOL: &str = "get_market_prices";

/// Tool that generates a rendered image.
pub const IMAGE_GENERATION_TOOL: &str = "generate_render";

/// Boxed event stream returned by a provider.
pub type ModelEventStream = Pin<Box<dyn Stream<Item = ModelEvent> + Send + 'static>>;

/// One event of the model's native output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    TextDelta {
        text: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        args: Value,
        result: Value,
    },
    Error {
        message: String,
    },
    Finished,
}

impl ModelEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn tool_call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Self {
        Self::ToolCall {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
        result: Value,
    ) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
            result,
        }
    }

    /// Returns true when this event ends the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Finished)
    }
}

/// Outcome of consulting a generation-class tool quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolQuotaDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Unix timestamp (seconds) at which the window resets.
    pub reset_at_unix: i64,
}

/// Lets a provider's tool executor consult the stricter per-tool sub-quota
/// before running an expensive tool.
#[async_trait]
pub trait ToolQuotaCheck: Send + Sync {
    /// Counts one use of `tool_name` and reports whether it may run.
    async fn consume(&self, tool_name: &str) -> ToolQuotaDecision;
}

/// Quota check that admits every tool call.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedToolQuota;

#[async_trait]
impl ToolQuotaCheck for UnlimitedToolQuota {
    async fn consume(&self, _tool_name: &str) -> ToolQuotaDecision {
        ToolQuotaDecision {
            allowed: true,
            remaining: u32::MAX,
            reset_at_unix: i64::MAX,
        }
    }
}

/// Input for one model turn.
#[derive(Clone)]
pub struct ModelRequest {
    pub session_id: String,
    /// Caller identity used for quota accounting.
    pub identity: String,
    /// Seeded history followed by the latest user turn, oldest first.
    pub messages: Vec<Message>,
    /// Inline images attached to the latest user turn.
    pub images: Vec<String>,
    pub tool_quota: Arc<dyn ToolQuotaCheck>,
}

impl fmt::Debug for ModelRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRequest")
            .field("session_id", &self.session_id)
            .field("identity", &self.identity)
            .field("messages", &self.messages)
            .field("images", &self.images.len())
            .finish_non_exhaustive()
    }
}

impl ModelRequest {
    pub fn latest_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role() == wire_protocol::Role::User)
            .map(Message::text)
    }
}

/// Identifies the provider and model behind a gate, for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Provider interface for one streamed model turn.
pub trait ModelProvider: Send + Sync + 'static {
    fn profile(&self) -> ProviderProfile;

    /// Starts a turn and returns its events in model order.
    ///
    /// The stream should end with [`ModelEvent::Finished`] or
    /// [`ModelEvent::Error`]; a stream that simply ends is treated as finished.
    fn stream(&self, request: ModelRequest) -> ModelEventStream;
}
