//! Line-framed chat stream protocol shared by the server multiplexer and the
//! client reducer.
//!
//! Every frame is one line of the form `<code>:<json>\n`. Frames are decoded
//! into the [`WireFrame`] tagged union at the boundary so consumers can match
//! exhaustively on the frame kind instead of comparing code strings.
//!
//! Decoding is lenient: a line with no separator, an unknown code, or a payload
//! that fails to parse is dropped and the stream carries on.

pub mod codec;
pub mod frame;
pub mod headers;
pub mod message;
pub mod request;

pub use codec::{decode, decode_line, encode, FrameDecodeError, FrameDecoder};
pub use frame::{FrameCode, WireFrame};
pub use message::{Attachments, Message, Role, ToolInvocation, ToolState};
pub use request::{ChatRequest, ToolCallRecord};
