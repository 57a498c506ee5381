use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use wire_protocol::{Message, Role, ToolCallRecord, ToolInvocation};

use crate::error::SessionStoreError;

/// A persisted conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    /// RFC 3339 UTC timestamp of the append.
    pub ts: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl StoredMessage {
    /// Rebuilds a transcript message, restoring tool calls as resolved invocations.
    #[must_use]
    pub fn to_message(&self) -> Message {
        let mut message = Message::new(&self.id, self.role, &self.text);
        for (index, record) in self.tool_calls.iter().enumerate() {
            let mut invocation = ToolInvocation::call(
                format!("{}-tool-{index}", self.id),
                &record.name,
                record.args.clone(),
            );
            invocation.resolve(record.result.clone());
            message.push_invocation(invocation);
        }
        message
    }
}

/// Async persistence collaborator used by the chat gate.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Creates the session if it does not exist yet. Idempotent.
    async fn ensure_session(&self, session_id: &str) -> Result<(), SessionStoreError>;

    /// Returns at most `limit` of the most recent messages, oldest first.
    ///
    /// Unknown sessions yield an empty list.
    async fn get(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, SessionStoreError>;

    async fn append(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
        tool_calls: Vec<ToolCallRecord>,
    ) -> Result<StoredMessage, SessionStoreError>;
}

pub(crate) fn now_rfc3339() -> Result<String, SessionStoreError> {
    use time::format_description::well_known::Rfc3339;

    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(SessionStoreError::ClockFormat)
}

pub(crate) fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Keeps the last `limit` items of `items` in their original order.
pub(crate) fn tail<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    let skip = items.len().saturating_sub(limit);
    items.drain(..skip);
    items
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wire_protocol::ToolState;

    use super::*;

    #[test]
    fn tail_keeps_most_recent_in_order() {
        assert_eq!(tail(vec![1, 2, 3, 4, 5], 2), vec![4, 5]);
        assert_eq!(tail(vec![1, 2], 10), vec![1, 2]);
        assert!(tail(vec![1, 2], 0).is_empty());
    }

    #[test]
    fn to_message_restores_resolved_tool_calls() {
        let stored = StoredMessage {
            id: "m1".to_string(),
            role: Role::Assistant,
            text: "here".to_string(),
            ts: "2026-02-14T00:00:00Z".to_string(),
            tool_calls: vec![ToolCallRecord {
                name: "get_market_prices".to_string(),
                args: json!({ "city": "Milano" }),
                result: json!("4200"),
            }],
        };

        let message = stored.to_message();
        assert_eq!(message.id(), "m1");
        assert_eq!(message.text(), "here");
        let invocation = &message.tool_invocations()[0];
        assert_eq!(invocation.tool_call_id(), "m1-tool-0");
        assert_eq!(invocation.state(), ToolState::Result);
        assert_eq!(invocation.result(), Some(&json!("4200")));
    }
}
