//! Command Handler Module
//!
//! Executes classified commands against the storage engine and returns the
//! reply to send.
//!
//! ## Commands
//!
//! - `GET key` - Returns the stored payload, or `(nil)`
//! - `SET key value` - Stores the value (after the codec accepts it)
//! - `DELETE key` - Removes the key; replies `OK` either way
//!
//! Anything else gets `-ERR Unknown command`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │  Command    │───>│  execute()  │───>│   Reply     │     │
//! │  └─────────────┘    └──────┬──────┘    └─────────────┘     │
//! │                            │                                │
//! │               ┌────────────┼────────────┐                   │
//! │               ▼            ▼            ▼                   │
//! │        PayloadCodec  StorageEngine  OperationSink           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::codec::{PayloadCodec, RawCodec};
use crate::protocol::{Command, Reply};
use crate::stats::{NoopSink, OperationSink};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, warn};

/// Dispatches commands to the storage engine.
///
/// Cheap to clone; every connection gets its own copy.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Codec applied to SET values
    codec: Arc<dyn PayloadCodec>,
    /// Receives per-operation timings
    sink: Arc<dyn OperationSink>,
}

impl CommandHandler {
    /// Creates a handler with the raw codec and no operation sink.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self {
            storage,
            codec: Arc::new(RawCodec),
            sink: Arc::new(NoopSink),
        }
    }

    /// Replaces the codec applied to SET values.
    pub fn with_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Replaces the operation sink.
    pub fn with_sink(mut self, sink: Arc<dyn OperationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the shared storage engine.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a command and returns the reply.
    pub fn execute(&self, command: Command) -> Reply {
        let kind = command.kind();
        let span = debug_span!("request", command = kind.as_str());
        let _enter = span.enter();

        let start = Instant::now();
        let reply = match command {
            Command::Get { key } => self.cmd_get(&key),
            Command::Set { key, value } => self.cmd_set(&key, value),
            Command::Delete { key } => self.cmd_delete(&key),
            Command::Invalid => Reply::Error,
        };
        self.sink.record_operation(kind, start.elapsed());

        reply
    }

    /// GET key
    fn cmd_get(&self, key: &str) -> Reply {
        match self.storage.get(key) {
            Some(value) => Reply::Payload(value),
            None => Reply::Nil,
        }
    }

    /// SET key value
    fn cmd_set(&self, key: &str, value: Bytes) -> Reply {
        let stored = match self.codec.to_stored(&value) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(key = key, codec = self.codec.name(), error = %e, "Rejected SET value");
                return Reply::Error;
            }
        };

        debug!(key = key, bytes = stored.len(), "Storing value");
        self.storage.set(key, stored);
        Reply::Ok
    }

    /// DELETE key
    fn cmd_delete(&self, key: &str) -> Reply {
        self.storage.delete(key);
        Reply::Ok
    }
}
