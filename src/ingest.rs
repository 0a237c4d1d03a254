//! Sync ingestion: reconciles one extension batch into storage.
//!
//! A batch is processed as a sequential loop of independent upserts. Each
//! conversation, message and file stands alone: if one fails it is logged
//! and skipped, and the batch carries on. Nothing wraps the batch in a
//! transaction. Every write is an idempotent upsert keyed by a stable id,
//! so resubmitting after a crash converges to the same state.
//!
//! The returned [`SyncCounts`] reflect rows actually written, not rows
//! submitted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db;
use crate::models::{Identity, SyncCounts};
use crate::payload::{normalize_conversation, normalize_file, normalize_message};
use crate::store::{SqliteStore, Store};

/// Batch-level failures. Only structural problems reject a whole batch.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("conversations must be an array")]
    MissingConversations,
}

/// Processes a batch stamped with the current time.
pub async fn sync_batch(
    store: &dyn Store,
    owner: &Identity,
    body: Value,
) -> Result<SyncCounts, SyncError> {
    sync_batch_at(store, owner, body, Utc::now()).await
}

/// Processes a batch using `now` for defaulted timestamps and the
/// `syncedAt` metadata stamp.
pub async fn sync_batch_at(
    store: &dyn Store,
    owner: &Identity,
    body: Value,
    now: DateTime<Utc>,
) -> Result<SyncCounts, SyncError> {
    let Value::Object(mut body) = body else {
        return Err(SyncError::NotAnObject);
    };

    let conversations = match body.remove("conversations") {
        Some(Value::Array(items)) => items,
        _ => return Err(SyncError::MissingConversations),
    };

    let files = match body.remove("files") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            warn!(owner = %owner, "ignoring non-array files field");
            Vec::new()
        }
    };

    let submitted_conversations = conversations.len();
    let submitted_files = files.len();
    let mut counts = SyncCounts::default();

    for (position, raw) in conversations.into_iter().enumerate() {
        let normalized = match normalize_conversation(owner, raw, now) {
            Ok(n) => n,
            Err(e) => {
                warn!(owner = %owner, position, error = %e, "skipping conversation");
                continue;
            }
        };
        let conversation = normalized.conversation;

        if let Err(e) = store.upsert_conversation(&conversation).await {
            warn!(
                owner = %owner,
                conversation_id = %conversation.id,
                error = %e,
                "conversation upsert failed, skipping its messages"
            );
            continue;
        }
        counts.conversations += 1;

        for (index, raw_message) in normalized.messages.into_iter().enumerate() {
            let message = match normalize_message(owner, &conversation.id, index, raw_message) {
                Ok(m) => m,
                Err(e) => {
                    warn!(
                        owner = %owner,
                        conversation_id = %conversation.id,
                        index,
                        error = %e,
                        "skipping message"
                    );
                    continue;
                }
            };

            match store.upsert_message(&message).await {
                Ok(()) => counts.messages += 1,
                Err(e) => warn!(
                    owner = %owner,
                    conversation_id = %conversation.id,
                    message_id = %message.id,
                    error = %e,
                    "message upsert failed"
                ),
            }
        }
    }

    for (position, raw) in files.into_iter().enumerate() {
        let mut file = match normalize_file(owner, raw) {
            Ok(f) => f,
            Err(e) => {
                warn!(owner = %owner, position, error = %e, "skipping file");
                continue;
            }
        };

        if let Some(conversation_id) = file.conversation_id.clone() {
            match store
                .conversation_exists(owner.as_str(), &conversation_id)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        file_id = %file.id,
                        conversation_id = %conversation_id,
                        "file references unknown conversation, storing unlinked"
                    );
                    file.conversation_id = None;
                }
                Err(e) => {
                    warn!(owner = %owner, file_id = %file.id, error = %e, "skipping file");
                    continue;
                }
            }
        }

        match store.upsert_file(&file).await {
            Ok(()) => counts.files += 1,
            Err(e) => warn!(owner = %owner, file_id = %file.id, error = %e, "file upsert failed"),
        }
    }

    info!(
        owner = %owner,
        submitted_conversations,
        submitted_files,
        conversations = counts.conversations,
        messages = counts.messages,
        files = counts.files,
        "sync batch processed"
    );

    Ok(counts)
}

/// CLI entry point: runs a batch stored in a JSON file on behalf of `owner`.
pub async fn run_import(config: &Config, owner: &str, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
    let body: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse batch file: {}", path.display()))?;

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let owner = Identity::new(owner);

    let counts = sync_batch(&store, &owner, body).await?;

    println!("sync {}", owner);
    println!("  conversations: {}", counts.conversations);
    println!("  messages: {}", counts.messages);
    println!("  files: {}", counts.files);
    println!("ok");

    store.pool().close().await;
    Ok(())
}
