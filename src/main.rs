//! # threadkeep CLI
//!
//! The `threadkeep` binary runs the sync API and offers a handful of
//! operator commands against the same SQLite database.
//!
//! ## Usage
//!
//! ```bash
//! threadkeep --config ./config/threadkeep.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `threadkeep init` | Create the SQLite database and run schema migrations |
//! | `threadkeep serve` | Start the HTTP API |
//! | `threadkeep import <batch.json> --owner <id>` | Run a sync batch from a file |
//! | `threadkeep list --owner <id>` | List an owner's conversations |
//! | `threadkeep get <id> --owner <id>` | Print a conversation with its messages |
//! | `threadkeep delete <id> --owner <id>` | Delete a conversation |
//! | `threadkeep token issue <user-id>` | Mint a session token |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use threadkeep::{auth, config, get, ingest, migrate, server};

/// threadkeep: sync backend for captured AI chat conversations.
#[derive(Parser)]
#[command(
    name = "threadkeep",
    about = "threadkeep: sync backend for captured AI chat conversations",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/threadkeep.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the conversations, messages and
    /// files tables. Running it again is harmless.
    Init,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Run a sync batch stored in a JSON file.
    ///
    /// The file has the same shape as a `POST /sync` body.
    Import {
        /// Path to the batch JSON file.
        path: PathBuf,

        /// Owner identity to sync as.
        #[arg(long)]
        owner: String,
    },

    /// List an owner's conversations, most recently updated first.
    List {
        #[arg(long)]
        owner: String,

        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Print a conversation with its messages and files.
    Get {
        /// Conversation UUID.
        id: String,

        #[arg(long)]
        owner: String,
    },

    /// Delete a conversation and its messages.
    Delete {
        /// Conversation UUID.
        id: String,

        #[arg(long)]
        owner: String,
    },

    /// Manage session tokens.
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Mint a session token for a user id, signed with `[auth].secret`.
    Issue {
        user_id: String,

        /// Lifetime in seconds (defaults to `[auth].token_ttl_secs`).
        #[arg(long)]
        ttl: Option<u64>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("threadkeep=info,tower_http=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Import { path, owner } => {
            ingest::run_import(&cfg, &owner, &path).await?;
        }
        Commands::List { owner, limit } => {
            get::run_list(&cfg, &owner, limit).await?;
        }
        Commands::Get { id, owner } => {
            get::run_get(&cfg, &owner, &id).await?;
        }
        Commands::Delete { id, owner } => {
            get::run_delete(&cfg, &owner, &id).await?;
        }
        Commands::Token { action } => match action {
            TokenAction::Issue { user_id, ttl } => {
                auth::run_issue_token(&cfg.auth, &user_id, ttl)?;
            }
        },
    }

    Ok(())
}
