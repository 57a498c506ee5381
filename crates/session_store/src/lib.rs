//! Persistence for chat transcripts.
//!
//! [`MessageStore`] is the collaborator the chat server talks to. Two
//! implementations ship here: [`InMemoryMessageStore`] for tests and ephemeral
//! runs, and [`JsonlMessageStore`] which keeps one append-only JSONL file per
//! session.

mod error;
mod memory;
mod message;
mod paths;
mod schema;
mod store;

pub use error::SessionStoreError;
pub use memory::InMemoryMessageStore;
pub use message::{MessageStore, StoredMessage};
pub use paths::{session_file_name, validate_session_id, MAX_SESSION_ID_LEN};
pub use schema::{EntryRecordType, SessionEntry, SessionHeader, SessionRecordType};
pub use store::JsonlMessageStore;
