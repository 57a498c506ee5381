use serde_json::{json, Value};

/// Single-character code that prefixes every frame line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameCode {
    TextDelta,
    Error,
    ToolCall,
    ToolResult,
}

impl FrameCode {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "0" => Self::TextDelta,
            "3" => Self::Error,
            "9" => Self::ToolCall,
            "a" => Self::ToolResult,
            _ => return None,
        })
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::TextDelta => '0',
            Self::Error => '3',
            Self::ToolCall => '9',
            Self::ToolResult => 'a',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextDelta => "text-delta",
            Self::Error => "error",
            Self::ToolCall => "tool-call",
            Self::ToolResult => "tool-result",
        }
    }
}

/// One decoded frame of the chat stream.
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    /// Text appended to the open assistant message.
    TextDelta(String),
    /// Stream-level failure raised to the request orchestrator.
    Error { error: String },
    /// A tool invocation started.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    /// A previously started tool invocation produced a result.
    ToolResult { tool_call_id: String, result: Value },
}

impl WireFrame {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta(text.into())
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
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

    pub fn tool_result(tool_call_id: impl Into<String>, result: Value) -> Self {
        Self::ToolResult {
            tool_call_id: tool_call_id.into(),
            result,
        }
    }

    pub fn code(&self) -> FrameCode {
        match self {
            Self::TextDelta(_) => FrameCode::TextDelta,
            Self::Error { .. } => FrameCode::Error,
            Self::ToolCall { .. } => FrameCode::ToolCall,
            Self::ToolResult { .. } => FrameCode::ToolResult,
        }
    }

    /// JSON payload carried after the `<code>:` prefix.
    pub fn payload(&self) -> Value {
        match self {
            Self::TextDelta(text) => Value::String(text.clone()),
            Self::Error { error } => json!({ "error": error }),
            Self::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => json!({
                "toolCallId": tool_call_id,
                "toolName": tool_name,
                "args": args,
            }),
            Self::ToolResult {
                tool_call_id,
                result,
            } => json!({
                "toolCallId": tool_call_id,
                "result": result,
            }),
        }
    }
}
