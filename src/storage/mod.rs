//! Storage Engine Module
//!
//! This module provides the in-memory key-value store shared by every
//! client connection.
//!
//! ## Features
//!
//! - **Single RwLock**: Multiple concurrent readers, exclusive writers
//! - **Opaque values**: Values are `Bytes`, cloned by reference count on read
//! - **Operation counters**: Successful SET/GET/DELETE calls are counted
//!
//! ## Example
//!
//! ```
//! use linekv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set("user:1", Bytes::from("data"));
//! assert_eq!(engine.get("user:1"), Some(Bytes::from("data")));
//!
//! let stats = engine.statistics();
//! assert_eq!((stats.sets, stats.gets, stats.deletes), (1, 1, 0));
//! ```

pub mod engine;

// Re-export commonly used types
pub use engine::{StorageEngine, StoreStats};
