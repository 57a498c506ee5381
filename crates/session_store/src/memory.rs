use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use wire_protocol::{Role, ToolCallRecord};

use crate::error::SessionStoreError;
use crate::message::{new_message_id, now_rfc3339, tail, MessageStore, StoredMessage};
use crate::paths::validate_session_id;

/// Process-local store; contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    sessions: Mutex<HashMap<String, Vec<StoredMessage>>>,
}

impl InMemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn ensure_session(&self, session_id: &str) -> Result<(), SessionStoreError> {
        validate_session_id(session_id)?;
        self.sessions
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default();
        Ok(())
    }

    async fn get(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, SessionStoreError> {
        validate_session_id(session_id)?;
        let sessions = self.sessions.lock().await;
        let messages = sessions.get(session_id).cloned().unwrap_or_default();
        Ok(tail(messages, limit))
    }

    async fn append(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
        tool_calls: Vec<ToolCallRecord>,
    ) -> Result<StoredMessage, SessionStoreError> {
        validate_session_id(session_id)?;
        let message = StoredMessage {
            id: new_message_id(),
            role,
            text: text.to_string(),
            ts: now_rfc3339()?,
            tool_calls,
        };

        self.sessions
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }
}
