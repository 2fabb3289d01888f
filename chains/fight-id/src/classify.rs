//! Reads free-text rejection messages from the API and decides whether they
//! mean "nothing left to do" rather than a real failure.
//!
//! The server does not expose error codes for these cases, so every phrase
//! match lives here and nowhere else.

use crate::client::ApiError;

/// Idempotent conflict recognised in a rejection message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    Cooldown,
    AlreadyDone,
    EntryLimit,
    None,
}

impl Conflict {
    pub fn is_conflict(self) -> bool {
        self != Conflict::None
    }
}

const CONFLICT_PATTERNS: &[(&str, Conflict)] = &[
    ("cooldown", Conflict::Cooldown),
    ("entry limit", Conflict::EntryLimit),
    ("already", Conflict::AlreadyDone),
];

pub fn classify_conflict(message: &str) -> Conflict {
    let lower = message.to_lowercase();
    CONFLICT_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, conflict)| *conflict)
        .unwrap_or(Conflict::None)
}

/// Prefers the server's `message` field when the error carries one.
pub fn error_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ApiError>() {
        Some(ApiError::Rejected { message, .. }) => message.clone(),
        _ => err.to_string(),
    }
}

pub fn classify_error(err: &anyhow::Error) -> Conflict {
    classify_conflict(&error_message(err))
}
