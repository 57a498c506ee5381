use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolState {
    Call,
    Result,
}

/// A call/result pair identified by `tool_call_id`.
///
/// Invocations are only ever created in [`ToolState::Call`] and move to
/// [`ToolState::Result`] at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    tool_call_id: String,
    tool_name: String,
    state: ToolState,
    #[serde(default)]
    args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
}

impl ToolInvocation {
    #[must_use]
    pub fn call(tool_call_id: impl Into<String>, tool_name: impl Into<String>, args: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            state: ToolState::Call,
            args,
            result: None,
        }
    }

    /// Attaches a result. Returns false when the invocation was already resolved.
    pub fn resolve(&mut self, result: Value) -> bool {
        if self.state == ToolState::Result {
            return false;
        }

        self.state = ToolState::Result;
        self.result = Some(result);
        true
    }

    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn state(&self) -> ToolState {
        self.state
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.state == ToolState::Call
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachments {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// One transcript entry.
///
/// `id` and `role` are fixed at construction; `text` and the tool invocation
/// list only grow while the message is streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    id: String,
    role: Role,
    #[serde(default, alias = "content")]
    text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_invocations: Vec<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attachments: Option<Attachments>,
}

impl Message {
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            text: text.into(),
            tool_invocations: Vec::new(),
            attachments: None,
        }
    }

    #[must_use]
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, text)
    }

    #[must_use]
    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, text)
    }

    #[must_use]
    pub fn with_attachments(mut self, attachments: Attachments) -> Self {
        if !attachments.images.is_empty() {
            self.attachments = Some(attachments);
        }
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tool_invocations(&self) -> &[ToolInvocation] {
        &self.tool_invocations
    }

    pub fn attachments(&self) -> Option<&Attachments> {
        self.attachments.as_ref()
    }

    pub fn invocation(&self, tool_call_id: &str) -> Option<&ToolInvocation> {
        self.tool_invocations
            .iter()
            .find(|invocation| invocation.tool_call_id == tool_call_id)
    }

    pub fn append_text(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    pub fn push_invocation(&mut self, invocation: ToolInvocation) {
        self.tool_invocations.push(invocation);
    }

    /// Resolves the first pending invocation with a matching id.
    ///
    /// Returns false when no such invocation was ever started or it already
    /// carries a result.
    pub fn resolve_invocation(&mut self, tool_call_id: &str, result: Value) -> bool {
        self.tool_invocations
            .iter_mut()
            .find(|invocation| invocation.tool_call_id == tool_call_id && invocation.is_pending())
            .is_some_and(|invocation| invocation.resolve(result))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Message, Role, ToolInvocation, ToolState};

    #[test]
    fn invocation_resolves_exactly_once() {
        let mut invocation = ToolInvocation::call("t1", "x", json!({}));
        assert!(invocation.is_pending());
        assert!(invocation.resolve(json!({ "ok": true })));
        assert!(!invocation.resolve(json!({ "ok": false })));
        assert_eq!(invocation.state(), ToolState::Result);
        assert_eq!(invocation.result(), Some(&json!({ "ok": true })));
    }

    #[test]
    fn resolving_unknown_invocation_leaves_message_unchanged() {
        let mut message = Message::assistant("a1", "");
        message.push_invocation(ToolInvocation::call("t1", "x", json!({})));
        let before = message.clone();

        assert!(!message.resolve_invocation("missing", json!(1)));
        assert_eq!(message, before);
    }

    #[test]
    fn message_accepts_content_alias_and_missing_id() {
        let message: Message =
            serde_json::from_value(json!({ "role": "user", "content": "ciao" })).expect("message");
        assert_eq!(message.role(), Role::User);
        assert_eq!(message.text(), "ciao");
        assert_eq!(message.id(), "");
    }

    #[test]
    fn message_serializes_invocations_in_camel_case() {
        let mut message = Message::assistant("a1", "hi");
        message.push_invocation(ToolInvocation::call("t1", "x", json!({})));
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            value,
            json!({
                "id": "a1",
                "role": "assistant",
                "text": "hi",
                "toolInvocations": [
                    { "toolCallId": "t1", "toolName": "x", "state": "call", "args": {} }
                ]
            })
        );
    }
}
