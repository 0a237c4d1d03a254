//! In-memory [`Store`] implementation for tests and embedding.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Ordering for
//! [`Store::list_conversations`] uses a write sequence number in place of a
//! wall-clock `updated_at`, so two writes in the same second still order
//! deterministically.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{Conversation, Message, StoredFile};

use super::{
    clamp_limit, format_ts_iso, parse_json_or_empty, ConversationResponse, ConversationSummary,
    FileResponse, MessageResponse, Store, StoreError,
};

struct Stamped<T> {
    record: T,
    seq: u64,
    updated_at: i64,
}

#[derive(Default)]
struct Tables {
    seq: u64,
    conversations: HashMap<String, Stamped<Conversation>>,
    messages: HashMap<String, Stamped<Message>>,
    files: HashMap<String, Stamped<StoredFile>>,
}

impl Tables {
    fn next_stamp<T>(&mut self, record: T) -> Stamped<T> {
        self.seq += 1;
        Stamped {
            record,
            seq: self.seq,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// In-memory store. Cheap to construct; all data is lost on drop.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_count(&self) -> usize {
        self.tables.read().map_or(0, |t| t.conversations.len())
    }

    pub fn message_count(&self) -> usize {
        self.tables.read().map_or(0, |t| t.messages.len())
    }

    pub fn file_count(&self) -> usize {
        self.tables.read().map_or(0, |t| t.files.len())
    }

    /// Raw stored record, bypassing owner scoping. Test inspection only.
    pub fn file(&self, id: &str) -> Option<StoredFile> {
        let tables = self.tables.read().ok()?;
        tables.files.get(id).map(|s| s.record.clone())
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

fn summary(stamped: &Stamped<Conversation>) -> ConversationSummary {
    let c = &stamped.record;
    ConversationSummary {
        id: c.id.clone(),
        platform: c.platform.clone(),
        url: c.url.clone(),
        title: c.title.clone(),
        message_count: c.message_count,
        code_block_count: c.code_block_count,
        first_message_at: format_ts_iso(c.first_message_at),
        last_message_at: format_ts_iso(c.last_message_at),
        metadata: parse_json_or_empty(&c.metadata_json),
        updated_at: format_ts_iso(stamped.updated_at),
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn upsert_conversation(&self, conv: &Conversation) -> Result<()> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.conversations.get(&conv.id) {
            if existing.record.user_id != conv.user_id {
                return Err(StoreError::OwnedByOther {
                    kind: "conversation",
                    id: conv.id.clone(),
                }
                .into());
            }
        }
        let stamped = tables.next_stamp(conv.clone());
        tables.conversations.insert(conv.id.clone(), stamped);
        Ok(())
    }

    async fn upsert_message(&self, msg: &Message) -> Result<()> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.messages.get(&msg.id) {
            if existing.record.user_id != msg.user_id {
                return Err(StoreError::OwnedByOther {
                    kind: "message",
                    id: msg.id.clone(),
                }
                .into());
            }
        }
        if !tables.conversations.contains_key(&msg.conversation_id) {
            return Err(anyhow!(
                "conversation {} does not exist for message {}",
                msg.conversation_id,
                msg.id
            ));
        }
        let stamped = tables.next_stamp(msg.clone());
        tables.messages.insert(msg.id.clone(), stamped);
        Ok(())
    }

    async fn upsert_file(&self, file: &StoredFile) -> Result<()> {
        let mut tables = self.write()?;
        if let Some(existing) = tables.files.get(&file.id) {
            if existing.record.user_id != file.user_id {
                return Err(StoreError::OwnedByOther {
                    kind: "file",
                    id: file.id.clone(),
                }
                .into());
            }
        }
        let stamped = tables.next_stamp(file.clone());
        tables.files.insert(file.id.clone(), stamped);
        Ok(())
    }

    async fn conversation_exists(&self, user_id: &str, id: &str) -> Result<bool> {
        let tables = self.read()?;
        Ok(tables
            .conversations
            .get(id)
            .is_some_and(|c| c.record.user_id == user_id))
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ConversationSummary>> {
        let tables = self.read()?;
        let mut owned: Vec<&Stamped<Conversation>> = tables
            .conversations
            .values()
            .filter(|c| c.record.user_id == user_id)
            .collect();
        owned.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(owned
            .into_iter()
            .take(clamp_limit(limit) as usize)
            .map(summary)
            .collect())
    }

    async fn get_conversation(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<ConversationResponse>> {
        let tables = self.read()?;
        let conv = match tables.conversations.get(id) {
            Some(c) if c.record.user_id == user_id => c,
            _ => return Ok(None),
        };

        let mut messages: Vec<&Message> = tables
            .messages
            .values()
            .map(|m| &m.record)
            .filter(|m| m.conversation_id == id && m.user_id == user_id)
            .collect();
        messages.sort_by(|a, b| {
            a.message_index
                .cmp(&b.message_index)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut files: Vec<&StoredFile> = tables
            .files
            .values()
            .map(|f| &f.record)
            .filter(|f| f.conversation_id.as_deref() == Some(id) && f.user_id == user_id)
            .collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename).then_with(|| a.id.cmp(&b.id)));

        Ok(Some(ConversationResponse {
            conversation: summary(conv),
            messages: messages
                .into_iter()
                .map(|m| MessageResponse {
                    id: m.id.clone(),
                    sender: m.sender.clone(),
                    content: m.content.clone(),
                    has_code: m.has_code,
                    code_blocks: m.code_blocks.clone(),
                    index: m.message_index,
                })
                .collect(),
            files: files
                .into_iter()
                .map(|f| FileResponse {
                    id: f.id.clone(),
                    filename: f.filename.clone(),
                    file_type: f.file_type.clone(),
                    size: f.size,
                    url: f.url.clone(),
                    platform: f.platform.clone(),
                    metadata: parse_json_or_empty(&f.metadata_json),
                })
                .collect(),
        }))
    }

    async fn delete_conversation(&self, user_id: &str, id: &str) -> Result<bool> {
        let mut tables = self.write()?;
        let owned = tables
            .conversations
            .get(id)
            .is_some_and(|c| c.record.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        tables.conversations.remove(id);
        tables.messages.retain(|_, m| m.record.conversation_id != id);
        for file in tables.files.values_mut() {
            if file.record.conversation_id.as_deref() == Some(id) {
                file.record.conversation_id = None;
            }
        }
        Ok(true)
    }
}
