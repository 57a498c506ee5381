//! Client side of the chat stream: reads framed response bodies, folds frames
//! into the transcript and runs one request at a time.

pub mod cancel;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod credentials;
pub mod decoder;
pub mod error;
pub mod reader;
pub mod transport;

pub use cancel::{await_or_cancel, is_cancelled, new_cancel_signal, raise, CancelSignal};
pub use config::ClientConfig;
pub use controller::{new_session_id, ChatController, RequestPhase, UserInput};
pub use conversation::{Conversation, FrameEffect, StreamError};
pub use credentials::{require_token, CredentialProvider, StaticCredentials};
pub use decoder::Utf8ChunkDecoder;
pub use error::{parse_error_message, ClientError};
pub use reader::{ReadOutcome, StreamReader};
pub use transport::{
    error_for_status, BodyStream, ChatResponse, ChatTransport, HttpTransport, QuotaSnapshot,
};
