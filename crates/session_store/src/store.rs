use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use wire_protocol::{Role, ToolCallRecord};

use crate::error::SessionStoreError;
use crate::message::{new_message_id, now_rfc3339, tail, MessageStore, StoredMessage};
use crate::paths::{session_file_name, validate_session_id};
use crate::schema::{SessionEntry, SessionHeader};

/// Append-only JSONL store with one file per session under `root`.
///
/// Line 1 of every file is a [`SessionHeader`]; each following line is a
/// [`SessionEntry`]. Writes are serialized through a single lock so concurrent
/// appends to the same session never interleave.
#[derive(Debug)]
pub struct JsonlMessageStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlMessageStore {
    /// Opens (creating if needed) the store directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SessionStoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|source| SessionStoreError::io("creating store directory", &root, source))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_path(&self, session_id: &str) -> Result<PathBuf, SessionStoreError> {
        validate_session_id(session_id)?;
        Ok(self.root.join(session_file_name(session_id)))
    }

    /// Reads and validates a whole session file.
    pub fn read_session(
        path: &Path,
        expected_session_id: &str,
    ) -> Result<(SessionHeader, Vec<SessionEntry>), SessionStoreError> {
        let read_file = File::open(path)
            .map_err(|source| SessionStoreError::io("opening session file", path, source))?;
        let reader = BufReader::new(read_file);

        let mut header: Option<SessionHeader> = None;
        let mut entries = Vec::new();
        let mut seen_ids = HashSet::new();

        for (line_index, line_result) in reader.lines().enumerate() {
            let line_number = line_index + 1;
            let line =
                line_result.map_err(|source| SessionStoreError::io_line(path, line_number, source))?;
            if line.trim().is_empty() {
                continue;
            }

            let value = serde_json::from_str::<Value>(&line)
                .map_err(|source| SessionStoreError::json_line(path, line_number, source))?;
            let record_type = value.get("type").and_then(Value::as_str);

            if header.is_none() {
                if record_type != Some("session") {
                    return Err(SessionStoreError::InvalidHeaderRecord {
                        path: path.to_path_buf(),
                        line: line_number,
                    });
                }
                let parsed = serde_json::from_value::<SessionHeader>(value)
                    .map_err(|source| SessionStoreError::json_line(path, line_number, source))?;
                validate_header_line(path, line_number, &parsed, expected_session_id)?;
                header = Some(parsed);
                continue;
            }

            if record_type != Some("entry") {
                return Err(SessionStoreError::InvalidEntryRecord {
                    path: path.to_path_buf(),
                    line: line_number,
                });
            }
            let entry = serde_json::from_value::<SessionEntry>(value)
                .map_err(|source| SessionStoreError::json_line(path, line_number, source))?;
            validate_rfc3339(path, line_number, "ts", &entry.ts)?;
            if !seen_ids.insert(entry.id.clone()) {
                return Err(SessionStoreError::DuplicateEntryId {
                    path: path.to_path_buf(),
                    line: line_number,
                    id: entry.id,
                });
            }
            entries.push(entry);
        }

        let header = header.ok_or_else(|| SessionStoreError::MissingHeader {
            path: path.to_path_buf(),
        })?;
        Ok((header, entries))
    }

    async fn run_blocking<T, F>(task: F) -> Result<T, SessionStoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, SessionStoreError> + Send + 'static,
    {
        tokio::task::spawn_blocking(task)
            .await
            .map_err(SessionStoreError::Worker)?
    }
}

#[async_trait]
impl MessageStore for JsonlMessageStore {
    async fn ensure_session(&self, session_id: &str) -> Result<(), SessionStoreError> {
        let path = self.session_path(session_id)?;
        let session_id = session_id.to_string();
        let _guard = self.write_lock.lock().await;
        Self::run_blocking(move || create_session_file(&path, &session_id)).await
    }

    async fn get(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, SessionStoreError> {
        let path = self.session_path(session_id)?;
        let session_id = session_id.to_string();
        Self::run_blocking(move || {
            if !path.exists() {
                return Ok(Vec::new());
            }
            let (_, entries) = Self::read_session(&path, &session_id)?;
            Ok(tail(entries, limit)
                .into_iter()
                .map(stored_from_entry)
                .collect())
        })
        .await
    }

    async fn append(
        &self,
        session_id: &str,
        role: Role,
        text: &str,
        tool_calls: Vec<ToolCallRecord>,
    ) -> Result<StoredMessage, SessionStoreError> {
        let path = self.session_path(session_id)?;
        let session_id = session_id.to_string();
        let entry = SessionEntry::new(new_message_id(), now_rfc3339()?, role, text, tool_calls);

        let _guard = self.write_lock.lock().await;
        Self::run_blocking(move || {
            create_session_file(&path, &session_id)?;
            let mut file = OpenOptions::new()
                .append(true)
                .open(&path)
                .map_err(|source| {
                    SessionStoreError::io("opening session file for append", &path, source)
                })?;
            write_json_line(&mut file, &path, &entry)?;
            Ok(stored_from_entry(entry))
        })
        .await
    }
}

fn create_session_file(path: &Path, session_id: &str) -> Result<(), SessionStoreError> {
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(source) if source.kind() == ErrorKind::AlreadyExists => return Ok(()),
        Err(source) => {
            return Err(SessionStoreError::io("creating session file", path, source));
        }
    };

    let header = SessionHeader::v1(session_id, now_rfc3339()?);
    write_json_line(&mut file, path, &header)?;
    tracing::debug!(session_id, path = %path.display(), "created session file");
    Ok(())
}

fn write_json_line(
    file: &mut File,
    path: &Path,
    record: &impl Serialize,
) -> Result<(), SessionStoreError> {
    let mut line = serde_json::to_string(record)
        .map_err(|source| SessionStoreError::json_serialize(path, source))?;
    line.push('\n');
    file.write_all(line.as_bytes())
        .map_err(|source| SessionStoreError::io("appending session line", path, source))
}

fn stored_from_entry(entry: SessionEntry) -> StoredMessage {
    StoredMessage {
        id: entry.id,
        role: entry.role,
        text: entry.text,
        ts: entry.ts,
        tool_calls: entry.tool_calls,
    }
}

fn validate_header_line(
    path: &Path,
    line_number: usize,
    header: &SessionHeader,
    expected_session_id: &str,
) -> Result<(), SessionStoreError> {
    if header.version != 1 {
        return Err(SessionStoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            line: line_number,
            found: header.version,
        });
    }

    validate_rfc3339(path, line_number, "created_at", &header.created_at)?;

    if header.session_id != expected_session_id {
        return Err(SessionStoreError::SessionMismatch {
            path: path.to_path_buf(),
            expected: expected_session_id.to_string(),
            found: header.session_id.clone(),
        });
    }

    Ok(())
}

fn validate_rfc3339(
    path: &Path,
    line_number: usize,
    field: &'static str,
    value: &str,
) -> Result<(), SessionStoreError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(SessionStoreError::InvalidTimestamp {
            path: path.to_path_buf(),
            line: line_number,
            field,
            value: value.to_string(),
        });
    }

    Ok(())
}
