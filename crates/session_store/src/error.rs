use std::path::PathBuf;

use thiserror::Error;

/// Failures of the transcript stores. Line numbers are 1-based.

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("transcript store failed {operation} ({path}): {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transcript {path} unreadable at line {line}: {source}")]
    IoLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("transcript {path} line {line} is not valid JSON: {source}")]
    JsonLineParse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("transcript {path} has no session header")]
    MissingHeader { path: PathBuf },

    #[error("transcript {path} line {line}: expected the session header")]
    InvalidHeaderRecord { path: PathBuf, line: usize },

    #[error("transcript {path} line {line}: version {found} is not supported")]
    UnsupportedVersion {
        path: PathBuf,
        line: usize,
        found: u32,
    },

    #[error("transcript {path} is for session {found:?}, not {expected:?}")]
    SessionMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("transcript {path} line {line}: message id {id:?} repeats an earlier one")]
    DuplicateEntryId {
        path: PathBuf,
        line: usize,
        id: String,
    },

    #[error("transcript {path} line {line}: expected a message entry")]
    InvalidEntryRecord { path: PathBuf, line: usize },

    #[error("transcript {path} line {line}: {field} {value:?} is not an RFC 3339 timestamp")]
    InvalidTimestamp {
        path: PathBuf,
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("session id {session_id:?} rejected: {reason}")]
    InvalidSessionId {
        session_id: String,
        reason: &'static str,
    },

    #[error("could not encode a transcript line for {path}: {source}")]
    JsonSerialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("clock produced an unformattable timestamp: {0}")]
    ClockFormat(#[source] time::error::Format),

    #[error("blocking transcript task failed: {0}")]
    Worker(#[source] tokio::task::JoinError),
}

impl SessionStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn io_line(path: impl Into<PathBuf>, line: usize, source: std::io::Error) -> Self {
        Self::IoLine {
            path: path.into(),
            line,
            source,
        }
    }

    #[must_use]
    pub fn json_line(path: impl Into<PathBuf>, line: usize, source: serde_json::Error) -> Self {
        Self::JsonLineParse {
            path: path.into(),
            line,
            source,
        }
    }

    #[must_use]
    pub fn json_serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::JsonSerialize {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn invalid_session_id(session_id: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidSessionId {
            session_id: session_id.into(),
            reason,
        }
    }
}
