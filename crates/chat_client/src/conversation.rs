//! Ordered in-memory transcript and the frame reducer that mutates it.

use thiserror::Error;
use wire_protocol::{Message, ToolInvocation, WireFrame};

/// What applying a frame did to the target message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEffect {
    TextAppended,
    ToolCallStarted,
    ToolResultApplied,
    /// A start frame for a `toolCallId` the message already carries.
    DuplicateCallIgnored,
    /// A result with no matching pending call; nothing changed.
    OrphanResultDropped,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("{0}")]
    Server(String),
    #[error("message '{0}' is not part of the conversation")]
    UnknownMessage(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
    revision: u64,
}

impl Conversation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            revision: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id() == message_id)
    }

    /// Increases by one on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.revision += 1;
    }

    /// Replaces the whole transcript, e.g. after loading history.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.revision += 1;
    }

    /// Applies one decoded frame to the message with `message_id`.
    ///
    /// An error frame leaves the message untouched and is returned as
    /// [`StreamError::Server`].
    pub fn apply(&mut self, message_id: &str, frame: &WireFrame) -> Result<FrameEffect, StreamError> {
        let index = self
            .messages
            .iter()
            .position(|message| message.id() == message_id)
            .ok_or_else(|| StreamError::UnknownMessage(message_id.to_string()))?;

        let mut next = self.messages[index].clone();
        let effect = match frame {
            WireFrame::TextDelta(delta) => {
                next.append_text(delta);
                FrameEffect::TextAppended
            }
            WireFrame::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => {
                if next.invocation(tool_call_id).is_some() {
                    return Ok(FrameEffect::DuplicateCallIgnored);
                }
                next.push_invocation(ToolInvocation::call(
                    tool_call_id,
                    tool_name,
                    args.clone(),
                ));
                FrameEffect::ToolCallStarted
            }
            WireFrame::ToolResult {
                tool_call_id,
                result,
            } => {
                if !next.resolve_invocation(tool_call_id, result.clone()) {
                    tracing::debug!(%tool_call_id, "dropping tool result without a pending call");
                    return Ok(FrameEffect::OrphanResultDropped);
                }
                FrameEffect::ToolResultApplied
            }
            WireFrame::Error { error } => return Err(StreamError::Server(error.clone())),
        };

        self.messages[index] = next;
        self.revision += 1;
        Ok(effect)
    }
}
