use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, Role};

/// JSON body of a chat turn submitted by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
}

impl ChatRequest {
    #[must_use]
    pub fn new(session_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            session_id: Some(session_id.into()),
            images: None,
            image_urls: None,
        }
    }

    /// Session id when present and not blank.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Text of the newest user message, if the last message is a user turn.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.messages
            .last()
            .filter(|message| message.role() == Role::User)
            .map(Message::text)
    }

    pub fn has_inline_images(&self) -> bool {
        self.images.as_ref().is_some_and(|images| !images.is_empty())
    }

    pub fn first_image_url(&self) -> Option<&str> {
        self.image_urls
            .as_ref()
            .and_then(|urls| urls.first())
            .map(String::as_str)
    }
}

/// Tool call metadata persisted alongside an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub result: Value,
}
