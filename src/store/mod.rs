//! Storage abstraction for threadkeep.
//!
//! The [`Store`] trait is the persistence collaborator used by the sync
//! processor and the read/delete endpoints. Every method is scoped by the
//! owner's user id; no method can read or touch another owner's rows.
//!
//! Implementations must be `Send + Sync` to be shared across request
//! handlers.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{Conversation, Message, StoredFile};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Upper bound for [`Store::list_conversations`].
pub const MAX_LIST_LIMIT: i64 = 500;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The id already exists under a different owner; the row was left alone.
    #[error("{kind} {id} belongs to another owner")]
    OwnedByOther { kind: &'static str, id: String },
}

/// One row of the conversation list.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub platform: String,
    pub url: Option<String>,
    pub title: String,
    pub message_count: i64,
    pub code_block_count: i64,
    pub first_message_at: String,
    pub last_message_at: String,
    pub metadata: serde_json::Value,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub sender: String,
    pub content: String,
    pub has_code: bool,
    pub code_blocks: Vec<String>,
    pub index: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub size: i64,
    pub url: Option<String>,
    pub platform: String,
    pub metadata: serde_json::Value,
}

/// A conversation with its messages (ordered by index) and linked files.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConversationResponse {
    #[serde(flatten)]
    pub conversation: ConversationSummary,
    pub messages: Vec<MessageResponse>,
    pub files: Vec<FileResponse>,
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_conversation`](Store::upsert_conversation) | Insert or fully replace a conversation |
/// | [`upsert_message`](Store::upsert_message) | Insert or fully replace a message |
/// | [`upsert_file`](Store::upsert_file) | Insert or fully replace a file record |
/// | [`conversation_exists`](Store::conversation_exists) | Ownership-scoped existence check |
/// | [`list_conversations`](Store::list_conversations) | Most recently updated first |
/// | [`get_conversation`](Store::get_conversation) | Conversation with messages and files |
/// | [`delete_conversation`](Store::delete_conversation) | Remove a conversation and its messages |
///
/// Upserts fail with [`StoreError::OwnedByOther`] when the id is held by a
/// different owner.
#[async_trait]
pub trait Store: Send + Sync {
    async fn upsert_conversation(&self, conv: &Conversation) -> Result<()>;

    async fn upsert_message(&self, msg: &Message) -> Result<()>;

    async fn upsert_file(&self, file: &StoredFile) -> Result<()>;

    async fn conversation_exists(&self, user_id: &str, id: &str) -> Result<bool>;

    async fn list_conversations(&self, user_id: &str, limit: i64)
        -> Result<Vec<ConversationSummary>>;

    async fn get_conversation(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<ConversationResponse>>;

    /// Returns `false` when nothing owned by `user_id` had that id.
    async fn delete_conversation(&self, user_id: &str, id: &str) -> Result<bool>;
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

pub(crate) fn parse_json_or_empty(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(serde_json::json!({}))
}

pub(crate) fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_LIST_LIMIT)
}
