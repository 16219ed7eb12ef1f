//! # LineKV - A Minimal In-Memory Key-Value Server
//!
//! LineKV is a small key-value server that speaks a space-delimited text
//! protocol over TCP. It is built around a zero-copy command tokenizer, a
//! lock-guarded store, and a per-connection state machine with bounded
//! concurrency and deterministic resource cleanup.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             LineKV                               │
//! │                                                                  │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐           │
//! │  │  Listener   │───>│ Connection  │───>│  Command    │           │
//! │  │ (admission) │    │  Handler    │    │  Handler    │           │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘           │
//! │                            │                  │                  │
//! │                            ▼                  ▼                  │
//! │                     ┌─────────────┐    ┌──────────────────────┐  │
//! │                     │  Tokenizer  │    │    StorageEngine     │  │
//! │                     │ (zero-copy) │    │ RwLock<HashMap<..>>  │  │
//! │                     └─────────────┘    └──────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use linekv::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = Server::new(Config::default())?;
//!     let listener = server.bind().await?;
//!     server.run(listener, tokio::signal::ctrl_c()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value` → `OK\r\n`
//! - `GET key` → the stored bytes, or `(nil)\r\n`
//! - `DELETE key` → `OK\r\n`
//!
//! Anything else is answered with `-ERR Unknown command\r\n`.
//!
//! ## Module Overview
//!
//! - [`protocol`]: Tokenizer, command classification and replies
//! - [`storage`]: Thread-safe key-value store with operation counters
//! - [`codec`]: Value codecs applied to `SET` payloads
//! - [`commands`]: Executes commands against the store
//! - [`connection`]: Per-connection state machine and buffer pool
//! - [`server`]: Accept loop, admission control and shutdown

pub mod codec;
pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod stats;
pub mod storage;

// Re-export commonly used types for convenience
pub use codec::{CodecKind, JsonCodec, RawCodec, UserProfile, ValueCodec};
pub use commands::CommandHandler;
pub use config::{CliArgs, Config, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::{handle_connection, ConnectionHandler, ConnectionLimits};
pub use protocol::{Command, CommandKind, CommandParts, Parsed, Reply};
pub use server::{Server, ServerError};
pub use stats::{OperationSink, ServerStats};
pub use storage::{StorageEngine, StoreStats};

/// Version of LineKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
