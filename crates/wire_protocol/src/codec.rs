use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::frame::{FrameCode, WireFrame};

/// Reason a single line could not be turned into a frame.
#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("frame line is empty")]
    Empty,

    #[error("frame line has no code separator")]
    MissingSeparator,

    #[error("unknown frame code '{0}'")]
    UnknownCode(String),

    #[error("invalid {code} payload: {source}")]
    InvalidPayload {
        code: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorPayload {
    Object { error: String },
    Bare(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallPayload {
    tool_call_id: String,
    tool_name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolResultPayload {
    tool_call_id: String,
    #[serde(default)]
    result: Value,
}

/// Encodes one frame as a complete protocol line, trailing newline included.
pub fn encode(frame: &WireFrame) -> String {
    format!("{}:{}\n", frame.code().as_char(), frame.payload())
}

/// Decodes one line (without its newline) into a frame.
pub fn decode_line(line: &str) -> Result<WireFrame, FrameDecodeError> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() {
        return Err(FrameDecodeError::Empty);
    }

    let (code, payload) = line
        .split_once(':')
        .ok_or(FrameDecodeError::MissingSeparator)?;
    let code = FrameCode::parse(code)
        .ok_or_else(|| FrameDecodeError::UnknownCode(code.to_string()))?;
    let invalid = |source: serde_json::Error| FrameDecodeError::InvalidPayload {
        code: code.as_str(),
        source,
    };

    Ok(match code {
        FrameCode::TextDelta => {
            WireFrame::TextDelta(serde_json::from_str(payload).map_err(invalid)?)
        }
        FrameCode::Error => match serde_json::from_str::<ErrorPayload>(payload).map_err(invalid)? {
            ErrorPayload::Object { error } | ErrorPayload::Bare(error) => {
                WireFrame::Error { error }
            }
        },
        FrameCode::ToolCall => {
            let parsed: ToolCallPayload = serde_json::from_str(payload).map_err(invalid)?;
            WireFrame::ToolCall {
                tool_call_id: parsed.tool_call_id,
                tool_name: parsed.tool_name,
                args: parsed.args,
            }
        }
        FrameCode::ToolResult => {
            let parsed: ToolResultPayload = serde_json::from_str(payload).map_err(invalid)?;
            WireFrame::ToolResult {
                tool_call_id: parsed.tool_call_id,
                result: parsed.result,
            }
        }
    })
}

/// Splits `buffer` on newlines and decodes every complete line.
///
/// The final segment is returned untouched as leftover, to be prefixed to the
/// next chunk. Lines that fail to decode are dropped.
pub fn decode(buffer: &str) -> (Vec<WireFrame>, String) {
    let (complete, leftover) = match buffer.rfind('\n') {
        Some(split) => (&buffer[..split], &buffer[split + 1..]),
        None => return (Vec::new(), buffer.to_string()),
    };

    let frames = complete.split('\n').filter_map(decode_lenient).collect();
    (frames, leftover.to_string())
}

fn decode_lenient(line: &str) -> Option<WireFrame> {
    match decode_line(line) {
        Ok(frame) => Some(frame),
        Err(FrameDecodeError::Empty) => None,
        Err(error) => {
            tracing::debug!(%error, "dropping undecodable frame line");
            None
        }
    }
}

/// Incremental decoder that keeps the partial trailing line between pushes.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
}

impl FrameDecoder {
    /// Feed decoded text and drain every frame completed by it.
    pub fn push(&mut self, text: &str) -> Vec<WireFrame> {
        self.buffer.push_str(text);
        let Some(split) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        let frames = self.buffer[..split]
            .split('\n')
            .filter_map(decode_lenient)
            .collect();
        self.buffer.drain(..=split);
        frames
    }

    /// Parse a complete body in one shot; an unterminated trailing line is ignored.
    pub fn decode_all(input: &str) -> Vec<WireFrame> {
        Self::default().push(input)
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{decode, decode_line, encode, FrameDecodeError, FrameDecoder};
    use crate::frame::WireFrame;

    #[test]
    fn encode_writes_code_colon_json_newline() {
        assert_eq!(encode(&WireFrame::text("hi \"there\"")), "0:\"hi \\\"there\\\"\"\n");
        assert_eq!(
            encode(&WireFrame::error("boom")),
            "3:{\"error\":\"boom\"}\n"
        );
    }

    #[test]
    fn decode_keeps_partial_trailing_line_as_leftover() {
        let (frames, leftover) = decode("0:\"a\"\n0:\"b");
        assert_eq!(frames, vec![WireFrame::text("a")]);
        assert_eq!(leftover, "0:\"b");
    }

    #[test]
    fn decode_without_newline_returns_everything_as_leftover() {
        let (frames, leftover) = decode("9:{\"toolCallId\"");
        assert!(frames.is_empty());
        assert_eq!(leftover, "9:{\"toolCallId\"");
    }

    #[test]
    fn decode_line_reports_each_failure_kind() {
        assert!(matches!(decode_line("   "), Err(FrameDecodeError::Empty)));
        assert!(matches!(
            decode_line("no separator"),
            Err(FrameDecodeError::MissingSeparator)
        ));
        assert!(matches!(
            decode_line("7:\"x\""),
            Err(FrameDecodeError::UnknownCode(code)) if code == "7"
        ));
        assert!(matches!(
            decode_line("0:not-json"),
            Err(FrameDecodeError::InvalidPayload { code: "text-delta", .. })
        ));
    }

    #[test]
    fn error_frames_accept_object_and_bare_string_payloads() {
        assert_eq!(
            decode_line("3:{\"error\":\"quota\"}").ok(),
            Some(WireFrame::error("quota"))
        );
        assert_eq!(
            decode_line("3:\"quota\"").ok(),
            Some(WireFrame::error("quota"))
        );
    }

    #[test]
    fn tool_call_without_args_defaults_to_null() {
        let frame = decode_line("9:{\"toolCallId\":\"t1\",\"toolName\":\"x\"}").ok();
        assert_eq!(
            frame,
            Some(WireFrame::tool_call("t1", "x", serde_json::Value::Null))
        );
    }

    #[test]
    fn crlf_terminated_lines_are_tolerated() {
        let frames = FrameDecoder::decode_all("0:\"a\"\r\na:{\"toolCallId\":\"t\",\"result\":1}\r\n");
        assert_eq!(
            frames,
            vec![WireFrame::text("a"), WireFrame::tool_result("t", json!(1))]
        );
    }

    #[test]
    fn decoder_holds_split_frame_until_newline_arrives() {
        let mut decoder = FrameDecoder::default();
        assert!(decoder.push("0:\"Hel").is_empty());
        assert!(!decoder.is_empty_buffer());
        assert_eq!(decoder.push("lo\"\n"), vec![WireFrame::text("Hello")]);
        assert!(decoder.is_empty_buffer());
    }
}
