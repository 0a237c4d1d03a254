//! # threadkeep
//!
//! Sync backend for AI chat conversations captured by the threadkeep
//! browser extension.
//!
//! The extension periodically posts batches of conversations (with their
//! messages) and attached files. Each batch is reconciled into SQLite with
//! idempotent upserts keyed by client-supplied ids, code blocks are pulled
//! out of message bodies, and per-conversation counters are kept from the
//! submitted payload. Every row is scoped to the authenticated owner.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  POST /sync  ┌──────────┐   ┌───────────┐   ┌──────────┐
//! │ Extension │─────────────▶│  server  │──▶│  ingest   │──▶│  store   │
//! └───────────┘   Bearer     │ + auth   │   │ + payload │   │  SQLite  │
//!                            └──────────┘   │ + code    │   └──────────┘
//!                                           └───────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Canonical record types |
//! | [`payload`] | Wire payload normalization |
//! | [`code`] | Code detection and fenced-block extraction |
//! | [`ingest`] | Batch sync processor |
//! | [`store`] | Storage trait, SQLite and in-memory backends |
//! | [`auth`] | Bearer token verification and minting |
//! | [`server`] | HTTP API |
//! | [`get`] | CLI retrieval commands |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod auth;
pub mod code;
pub mod config;
pub mod db;
pub mod get;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod payload;
pub mod server;
pub mod store;
