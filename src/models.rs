//! Core data models used throughout threadkeep.
//!
//! These are the canonical record shapes written to storage. Wire payloads
//! from the extension are folded into these by [`crate::payload`] before
//! anything touches the database.

use serde::Serialize;
use std::fmt;

/// Authenticated owner of a batch. Every stored row is scoped by it.
///
/// The value is either a session user id or an anonymous device token;
/// storage treats both the same.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized conversation ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub platform: String,
    pub url: Option<String>,
    pub title: String,
    pub message_count: i64,
    pub code_block_count: i64,
    pub first_message_at: i64,
    pub last_message_at: i64,
    pub metadata_json: String,
}

/// Normalized message ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub sender: String,
    pub content: String,
    pub has_code: bool,
    pub code_blocks: Vec<String>,
    /// Offset within the submitting batch's array, not a stable ordering key.
    pub message_index: i64,
}

/// Normalized file record ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub id: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub filename: String,
    pub file_type: String,
    pub size: i64,
    pub url: Option<String>,
    pub platform: String,
    pub metadata_json: String,
}

/// Per-kind count of rows actually written by one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub conversations: u64,
    pub messages: u64,
    pub files: u64,
}
