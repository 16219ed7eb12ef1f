//! Text Protocol Implementation
//!
//! This module implements the space-delimited command protocol spoken by
//! LineKV clients.
//!
//! ## Overview
//!
//! A command is a single line of up to three space-separated words:
//!
//! ```text
//! SET user:1 {"Id":1,"Username":"John"}
//! GET user:1
//! DELETE user:1
//! ```
//!
//! There is no length prefix. A command is complete once the tokenizer can
//! pull a well-formed triple out of the buffered bytes.
//!
//! ## Modules
//!
//! - `parser`: Zero-copy tokenizer producing `(name, key, value)` views
//! - `command`: Classification into the closed `Command` enum
//! - `reply`: Fixed reply constants and the `Reply` type
//!
//! ## Example
//!
//! ```
//! use linekv::protocol::{Command, Parsed, Reply};
//!
//! let parsed = Command::parse(b"GET user:1");
//! assert!(matches!(parsed, Parsed::Complete(Command::Get { .. })));
//!
//! assert_eq!(&Reply::Nil.to_bytes()[..], b"(nil)\r\n");
//! ```

pub mod command;
pub mod parser;
pub mod reply;

// Re-export commonly used types for convenience
pub use command::{Command, CommandKind, Parsed};
pub use parser::{parse, CommandParts, SPACE};
pub use reply::Reply;
