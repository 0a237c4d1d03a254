//! SQLite-backed [`Store`] implementation.
//!
//! Each upsert is a single `INSERT ... ON CONFLICT(id) DO UPDATE` statement
//! whose update arm is guarded by `user_id`, so a conflicting id held by
//! another owner changes zero rows and is reported as
//! [`StoreError::OwnedByOther`].

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::models::{Conversation, Message, StoredFile};

use super::{
    clamp_limit, format_ts_iso, parse_json_or_empty, ConversationResponse, ConversationSummary,
    FileResponse, MessageResponse, Store, StoreError,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn summary_from_row(row: &SqliteRow) -> ConversationSummary {
    let metadata_json: String = row.get("metadata_json");
    ConversationSummary {
        id: row.get("id"),
        platform: row.get("platform"),
        url: row.get("url"),
        title: row.get("title"),
        message_count: row.get("message_count"),
        code_block_count: row.get("code_block_count"),
        first_message_at: format_ts_iso(row.get("first_message_at")),
        last_message_at: format_ts_iso(row.get("last_message_at")),
        metadata: parse_json_or_empty(&metadata_json),
        updated_at: format_ts_iso(row.get("updated_at")),
    }
}

const SUMMARY_COLUMNS: &str = "id, platform, url, title, message_count, code_block_count, \
     first_message_at, last_message_at, metadata_json, updated_at";

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_conversation(&self, conv: &Conversation) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, platform, url, title, message_count,
                                       code_block_count, first_message_at, last_message_at,
                                       metadata_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                platform = excluded.platform,
                url = excluded.url,
                title = excluded.title,
                message_count = excluded.message_count,
                code_block_count = excluded.code_block_count,
                first_message_at = excluded.first_message_at,
                last_message_at = excluded.last_message_at,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            WHERE conversations.user_id = excluded.user_id
            "#,
        )
        .bind(&conv.id)
        .bind(&conv.user_id)
        .bind(&conv.platform)
        .bind(&conv.url)
        .bind(&conv.title)
        .bind(conv.message_count)
        .bind(conv.code_block_count)
        .bind(conv.first_message_at)
        .bind(conv.last_message_at)
        .bind(&conv.metadata_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OwnedByOther {
                kind: "conversation",
                id: conv.id.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn upsert_message(&self, msg: &Message) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let code_blocks_json = serde_json::to_string(&msg.code_blocks)?;
        let result = sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, user_id, sender, content, has_code,
                                  code_blocks_json, message_index, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                conversation_id = excluded.conversation_id,
                sender = excluded.sender,
                content = excluded.content,
                has_code = excluded.has_code,
                code_blocks_json = excluded.code_blocks_json,
                message_index = excluded.message_index,
                updated_at = excluded.updated_at
            WHERE messages.user_id = excluded.user_id
            "#,
        )
        .bind(&msg.id)
        .bind(&msg.conversation_id)
        .bind(&msg.user_id)
        .bind(&msg.sender)
        .bind(&msg.content)
        .bind(msg.has_code)
        .bind(&code_blocks_json)
        .bind(msg.message_index)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OwnedByOther {
                kind: "message",
                id: msg.id.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn upsert_file(&self, file: &StoredFile) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO files (id, user_id, conversation_id, filename, file_type, size, url,
                               platform, metadata_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                conversation_id = excluded.conversation_id,
                filename = excluded.filename,
                file_type = excluded.file_type,
                size = excluded.size,
                url = excluded.url,
                platform = excluded.platform,
                metadata_json = excluded.metadata_json,
                updated_at = excluded.updated_at
            WHERE files.user_id = excluded.user_id
            "#,
        )
        .bind(&file.id)
        .bind(&file.user_id)
        .bind(&file.conversation_id)
        .bind(&file.filename)
        .bind(&file.file_type)
        .bind(file.size)
        .bind(&file.url)
        .bind(&file.platform)
        .bind(&file.metadata_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OwnedByOther {
                kind: "file",
                id: file.id.clone(),
            }
            .into());
        }
        Ok(())
    }

    async fn conversation_exists(&self, user_id: &str, id: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM conversations WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM conversations WHERE user_id = ? \
             ORDER BY updated_at DESC, last_message_at DESC, id ASC LIMIT ?",
            SUMMARY_COLUMNS
        ))
        .bind(user_id)
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(summary_from_row).collect())
    }

    async fn get_conversation(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<ConversationResponse>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM conversations WHERE id = ? AND user_id = ?",
            SUMMARY_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let message_rows = sqlx::query(
            "SELECT id, sender, content, has_code, code_blocks_json, message_index FROM messages \
             WHERE conversation_id = ? AND user_id = ? ORDER BY message_index ASC, id ASC",
        )
        .bind(id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let messages = message_rows
            .iter()
            .map(|r| {
                let code_blocks_json: String = r.get("code_blocks_json");
                MessageResponse {
                    id: r.get("id"),
                    sender: r.get("sender"),
                    content: r.get("content"),
                    has_code: r.get("has_code"),
                    code_blocks: serde_json::from_str(&code_blocks_json).unwrap_or_default(),
                    index: r.get("message_index"),
                }
            })
            .collect();

        let file_rows = sqlx::query(
            "SELECT id, filename, file_type, size, url, platform, metadata_json FROM files \
             WHERE conversation_id = ? AND user_id = ? ORDER BY filename ASC, id ASC",
        )
        .bind(id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let files = file_rows
            .iter()
            .map(|r| {
                let metadata_json: String = r.get("metadata_json");
                FileResponse {
                    id: r.get("id"),
                    filename: r.get("filename"),
                    file_type: r.get("file_type"),
                    size: r.get("size"),
                    url: r.get("url"),
                    platform: r.get("platform"),
                    metadata: parse_json_or_empty(&metadata_json),
                }
            })
            .collect();

        Ok(Some(ConversationResponse {
            conversation: summary_from_row(&row),
            messages,
            files,
        }))
    }

    async fn delete_conversation(&self, user_id: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
