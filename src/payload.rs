//! Wire payloads submitted by the browser extension, and their
//! normalization into canonical records.
//!
//! The extension has shipped several payload revisions, so a few attributes
//! arrive under either a primary or an alternate key (`filename`/`name`,
//! `size`/`fileSize`, `url`/`platformUrl`, ...). Normalization folds each
//! pair into one field of the record types in [`crate::models`], applies
//! defaults, and resolves identifiers. Nothing downstream ever sees the
//! alternate names.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::code::{contains_code, extract_code_blocks};
use crate::models::{Conversation, Identity, Message, StoredFile};

pub const DEFAULT_PLATFORM: &str = "unknown";
pub const DEFAULT_TITLE: &str = "Untitled Conversation";
pub const DEFAULT_SENDER: &str = "user";
pub const DEFAULT_FILENAME: &str = "untitled";
pub const DEFAULT_FILE_TYPE: &str = "unknown";

/// Why a single submitted item could not be turned into a record.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("item is not a JSON object")]
    NotAnObject,
    #[error("invalid identifier: {0:?}")]
    InvalidId(String),
    #[error("malformed item: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A point in time as the extension sends it: RFC 3339 text or epoch
/// milliseconds. Any other JSON shape lands in `Other` and reads as absent.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimestampInput {
    Millis(i64),
    FractionalMillis(f64),
    Text(String),
    Other(Value),
}

impl TimestampInput {
    /// Unix seconds, or `None` when the value does not describe a valid time.
    pub fn to_unix_secs(&self) -> Option<i64> {
        match self {
            Self::Millis(ms) => DateTime::from_timestamp_millis(*ms).map(|dt| dt.timestamp()),
            Self::FractionalMillis(ms) if ms.is_finite() => {
                DateTime::from_timestamp_millis(*ms as i64).map(|dt| dt.timestamp())
            }
            Self::FractionalMillis(_) => None,
            Self::Text(s) => {
                let s = s.trim();
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.timestamp());
                }
                s.parse::<i64>()
                    .ok()
                    .and_then(DateTime::from_timestamp_millis)
                    .map(|dt| dt.timestamp())
            }
            Self::Other(_) => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationPayload {
    id: Option<String>,
    platform: Option<String>,
    url: Option<String>,
    platform_url: Option<String>,
    title: Option<String>,
    messages: Option<Vec<Value>>,
    code_blocks: Option<Vec<Value>>,
    first_message_at: Option<TimestampInput>,
    timestamp: Option<TimestampInput>,
    last_message_at: Option<TimestampInput>,
    project: Option<String>,
    tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct MessagePayload {
    id: Option<String>,
    sender: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilePayload {
    id: Option<String>,
    conversation_id: Option<String>,
    filename: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    file_type: Option<String>,
    #[serde(rename = "fileType")]
    file_type_alt: Option<String>,
    size: Option<f64>,
    file_size: Option<f64>,
    url: Option<String>,
    source_url: Option<String>,
    platform: Option<String>,
    metadata: Option<Value>,
}

/// A conversation record together with its still-raw nested messages.
///
/// Messages are kept as JSON so one malformed message does not sink the
/// conversation or its siblings.
#[derive(Debug)]
pub struct NormalizedConversation {
    pub conversation: Conversation,
    pub messages: Vec<Value>,
}

/// Resolves a submitted identifier: absent or blank ids get a fresh v4
/// UUID, anything else must parse as a UUID.
pub fn resolve_id(raw: Option<&str>) -> Result<String, PayloadError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Uuid::new_v4().to_string()),
        Some(s) => Uuid::parse_str(s)
            .map(|u| u.hyphenated().to_string())
            .map_err(|_| PayloadError::InvalidId(s.to_string())),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn object(raw: Value) -> Result<Value, PayloadError> {
    if raw.is_object() {
        Ok(raw)
    } else {
        Err(PayloadError::NotAnObject)
    }
}

fn platform_tag(raw: Option<String>) -> String {
    non_blank(raw)
        .map(|p| p.trim().to_lowercase())
        .unwrap_or_else(|| DEFAULT_PLATFORM.to_string())
}

pub fn normalize_conversation(
    owner: &Identity,
    raw: Value,
    now: DateTime<Utc>,
) -> Result<NormalizedConversation, PayloadError> {
    let payload: ConversationPayload = serde_json::from_value(object(raw)?)?;

    let id = resolve_id(payload.id.as_deref())?;
    let messages = payload.messages.unwrap_or_default();
    let code_block_count = payload.code_blocks.as_ref().map_or(0, Vec::len);

    let now_secs = now.timestamp();
    let first_message_at = payload
        .first_message_at
        .as_ref()
        .and_then(TimestampInput::to_unix_secs)
        .or_else(|| payload.timestamp.as_ref().and_then(TimestampInput::to_unix_secs))
        .unwrap_or(now_secs);
    let last_message_at = payload
        .last_message_at
        .as_ref()
        .and_then(TimestampInput::to_unix_secs)
        .unwrap_or(now_secs);

    let metadata = serde_json::json!({
        "project": non_blank(payload.project),
        "tags": payload.tags.unwrap_or_default(),
        "syncedAt": now.to_rfc3339_opts(SecondsFormat::Millis, true),
    });

    let conversation = Conversation {
        id,
        user_id: owner.as_str().to_string(),
        platform: platform_tag(payload.platform),
        url: non_blank(payload.url).or_else(|| non_blank(payload.platform_url)),
        title: non_blank(payload.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        message_count: messages.len() as i64,
        code_block_count: code_block_count as i64,
        first_message_at,
        last_message_at,
        metadata_json: metadata.to_string(),
    };

    Ok(NormalizedConversation {
        conversation,
        messages,
    })
}

pub fn normalize_message(
    owner: &Identity,
    conversation_id: &str,
    index: usize,
    raw: Value,
) -> Result<Message, PayloadError> {
    let payload: MessagePayload = serde_json::from_value(object(raw)?)?;

    let id = resolve_id(payload.id.as_deref())?;
    let content = payload.content.unwrap_or_default();

    Ok(Message {
        id,
        conversation_id: conversation_id.to_string(),
        user_id: owner.as_str().to_string(),
        sender: non_blank(payload.sender).unwrap_or_else(|| DEFAULT_SENDER.to_string()),
        has_code: contains_code(&content),
        code_blocks: extract_code_blocks(&content),
        content,
        message_index: index as i64,
    })
}

/// Folds a file payload into a [`StoredFile`].
///
/// The conversation reference is kept only if it is a well-formed id;
/// whether that conversation exists is decided at persistence time.
pub fn normalize_file(owner: &Identity, raw: Value) -> Result<StoredFile, PayloadError> {
    let payload: FilePayload = serde_json::from_value(object(raw)?)?;

    let id = resolve_id(payload.id.as_deref())?;
    let conversation_id = non_blank(payload.conversation_id)
        .and_then(|c| Uuid::parse_str(c.trim()).ok())
        .map(|u| u.hyphenated().to_string());

    let size = payload
        .size
        .or(payload.file_size)
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map_or(0, |s| s as i64);

    let metadata = payload
        .metadata
        .filter(|m| !m.is_null())
        .unwrap_or_else(|| serde_json::json!({}));

    Ok(StoredFile {
        id,
        user_id: owner.as_str().to_string(),
        conversation_id,
        filename: non_blank(payload.filename)
            .or_else(|| non_blank(payload.name))
            .unwrap_or_else(|| DEFAULT_FILENAME.to_string()),
        file_type: non_blank(payload.file_type)
            .or_else(|| non_blank(payload.file_type_alt))
            .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string()),
        size,
        url: non_blank(payload.url).or_else(|| non_blank(payload.source_url)),
        platform: platform_tag(payload.platform),
        metadata_json: metadata.to_string(),
    })
}
