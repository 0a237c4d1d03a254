//! Conversation retrieval, listing and deletion from the CLI.
//!
//! The HTTP server goes through the same [`Store`] methods; these functions
//! only add connection handling and terminal output.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::store::{SqliteStore, Store};

async fn open_store(config: &Config) -> Result<SqliteStore> {
    let pool = db::connect(config).await?;
    Ok(SqliteStore::new(pool))
}

/// CLI entry point for `threadkeep list`.
pub async fn run_list(config: &Config, owner: &str, limit: i64) -> Result<()> {
    let store = open_store(config).await?;
    let conversations = store.list_conversations(owner, limit).await?;
    store.pool().close().await;

    if conversations.is_empty() {
        println!("No conversations.");
        return Ok(());
    }

    for c in &conversations {
        println!(
            "{}  {:<10} {:>4} msgs  {}  {}",
            c.id, c.platform, c.message_count, c.last_message_at, c.title
        );
    }
    println!("{} conversation(s)", conversations.len());

    Ok(())
}

/// CLI entry point for `threadkeep get`.
pub async fn run_get(config: &Config, owner: &str, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let conversation = store.get_conversation(owner, id).await?;
    store.pool().close().await;

    let conv = match conversation {
        Some(c) => c,
        None => bail!("conversation not found: {}", id),
    };
    let summary = &conv.conversation;

    println!("--- Conversation ---");
    println!("id:               {}", summary.id);
    println!("title:            {}", summary.title);
    println!("platform:         {}", summary.platform);
    if let Some(ref url) = summary.url {
        println!("url:              {}", url);
    }
    println!("messages:         {}", summary.message_count);
    println!("code blocks:      {}", summary.code_block_count);
    println!("first message at: {}", summary.first_message_at);
    println!("last message at:  {}", summary.last_message_at);
    println!("metadata:         {}", summary.metadata);
    println!();

    println!("--- Messages ({}) ---", conv.messages.len());
    for m in &conv.messages {
        let tag = if m.has_code { " [code]" } else { "" };
        println!("[{}] {}{}", m.index, m.sender, tag);
        println!("{}", m.content);
        println!();
    }

    if !conv.files.is_empty() {
        println!("--- Files ({}) ---", conv.files.len());
        for f in &conv.files {
            println!("{}  {} ({}, {} bytes)", f.id, f.filename, f.file_type, f.size);
        }
    }

    Ok(())
}

/// CLI entry point for `threadkeep delete`.
pub async fn run_delete(config: &Config, owner: &str, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let deleted = store.delete_conversation(owner, id).await?;
    store.pool().close().await;

    if !deleted {
        bail!("conversation not found: {}", id);
    }
    println!("deleted {}", id);
    Ok(())
}
