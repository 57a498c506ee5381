use crate::error::SessionStoreError;

pub const MAX_SESSION_ID_LEN: usize = 128;

/// Rejects ids that could escape the store root or collide after mapping to a file name.
pub fn validate_session_id(session_id: &str) -> Result<(), SessionStoreError> {
    if session_id.is_empty() {
        return Err(SessionStoreError::invalid_session_id(session_id, "empty"));
    }

    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(SessionStoreError::invalid_session_id(
            session_id,
            "longer than 128 bytes",
        ));
    }

    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err(SessionStoreError::invalid_session_id(
            session_id,
            "only ASCII letters, digits, '-' and '_' are allowed",
        ));
    }

    Ok(())
}

#[must_use]
pub fn session_file_name(session_id: &str) -> String {
    format!("{session_id}.jsonl")
}
