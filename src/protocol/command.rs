//! Command Classification
//!
//! Turns a tokenized [`CommandParts`] triple into a closed [`Command`]
//! variant. Classification happens once per command; everything after it
//! is an exhaustive `match`.
//!
//! ## Completeness
//!
//! The protocol has no length prefix, so the connection keeps appending
//! bytes until the buffered line makes a well-formed command:
//!
//! | Buffered bytes          | Result                      |
//! |-------------------------|-----------------------------|
//! | `"SE"`                  | `Incomplete` (no key yet)   |
//! | `"SET user:1"`          | `Incomplete` (no value yet) |
//! | `"SET user:1 data"`     | `Set`                       |
//! | `"GET k\r"`             | `Incomplete` (no `\n` yet)   |
//! | `"GET\r\n"`             | `Invalid` (line ended)      |
//! | `"\r\n"`                 | `Blank` (late terminator)   |
//! | `"   "`                 | `Invalid` (no name at all)  |
//! | `"PING me"`             | `Invalid` (unknown name)    |

use crate::protocol::parser::{self, CommandParts, SPACE};
use bytes::Bytes;

/// A fully classified client command.
///
/// Keys and values are copied out of the read buffer so the buffer can be
/// reused as soon as classification is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `GET key`
    Get { key: String },
    /// `SET key value`
    Set { key: String, value: Bytes },
    /// `DELETE key`
    Delete { key: String },
    /// Unknown command name, missing field, or non-UTF-8 key
    Invalid,
}

/// The kind of a [`Command`], without its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Get,
    Set,
    Delete,
    Invalid,
}

impl CommandKind {
    /// Returns the canonical command name.
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Get => "GET",
            CommandKind::Set => "SET",
            CommandKind::Delete => "DELETE",
            CommandKind::Invalid => "INVALID",
        }
    }
}

/// Outcome of looking at the buffered bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// A complete command (possibly [`Command::Invalid`])
    Complete(Command),
    /// More bytes are needed before the command can be classified
    Incomplete,
    /// Only line-terminator bytes, left over from an already answered line
    Blank,
}

impl Command {
    /// Classifies the bytes buffered so far.
    ///
    /// A trailing `\n` or `\r\n` marks the line as finished, in which case
    /// a missing field is reported as [`Command::Invalid`] instead of
    /// waiting for more input. A trailing bare `\r` waits for its `\n`.
    pub fn parse(buf: &[u8]) -> Parsed {
        if !buf.is_empty() && buf.iter().all(|&b| b == b'\r' || b == b'\n') {
            return Parsed::Blank;
        }
        if buf.last() == Some(&b'\r') {
            return Parsed::Incomplete;
        }

        let (line, terminated) = strip_line_terminator(buf);
        let parts = parser::parse(line, SPACE);

        if !parts.is_valid() {
            let has_name = line.iter().any(|&b| b != SPACE);
            if has_name && !terminated {
                return Parsed::Incomplete;
            }
            return Parsed::Complete(Command::Invalid);
        }

        if !terminated && parts.name.eq_ignore_ascii_case(b"SET") && parts.value.is_empty() {
            return Parsed::Incomplete;
        }

        Parsed::Complete(Command::from_parts(&parts))
    }

    /// Classifies an already tokenized triple.
    pub fn from_parts(parts: &CommandParts<'_>) -> Command {
        if !parts.is_valid() {
            return Command::Invalid;
        }

        let key = match std::str::from_utf8(parts.key) {
            Ok(key) if !key.is_empty() => key.to_string(),
            _ => return Command::Invalid,
        };

        let name = parts.name;
        if name.eq_ignore_ascii_case(b"GET") {
            Command::Get { key }
        } else if name.eq_ignore_ascii_case(b"SET") {
            if parts.value.is_empty() {
                return Command::Invalid;
            }
            Command::Set {
                key,
                value: Bytes::copy_from_slice(parts.value),
            }
        } else if name.eq_ignore_ascii_case(b"DELETE") {
            Command::Delete { key }
        } else {
            Command::Invalid
        }
    }

    /// Returns the kind of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Get { .. } => CommandKind::Get,
            Command::Set { .. } => CommandKind::Set,
            Command::Delete { .. } => CommandKind::Delete,
            Command::Invalid => CommandKind::Invalid,
        }
    }

    /// Returns the canonical command name, used for logging.
    pub fn name(&self) -> &'static str {
        self.kind().as_str()
    }
}

/// Strips one trailing `\n` or `\r\n`, reporting whether one was present.
fn strip_line_terminator(buf: &[u8]) -> (&[u8], bool) {
    match buf {
        [rest @ .., b'\r', b'\n'] => (rest, true),
        [rest @ .., b'\n'] => (rest, true),
        _ => (buf, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(input: &[u8]) -> Command {
        match Command::parse(input) {
            Parsed::Complete(cmd) => cmd,
            other => panic!("{:?} should be complete, got {:?}", input, other),
        }
    }

    #[test]
    fn test_classify_get_set_delete() {
        assert_eq!(
            complete(b"GET user:1"),
            Command::Get {
                key: "user:1".to_string()
            }
        );
        assert_eq!(
            complete(b"SET user:1 data"),
            Command::Set {
                key: "user:1".to_string(),
                value: Bytes::from("data"),
            }
        );
        assert_eq!(
            complete(b"DELETE user:1"),
            Command::Delete {
                key: "user:1".to_string()
            }
        );
    }

    #[test]
    fn test_names_are_case_insensitive() {
        assert!(matches!(complete(b"get k"), Command::Get { .. }));
        assert!(matches!(complete(b"Set k v"), Command::Set { .. }));
        assert!(matches!(complete(b"dElEtE k"), Command::Delete { .. }));
    }

    #[test]
    fn test_unknown_command_is_invalid() {
        assert_eq!(complete(b"PING me"), Command::Invalid);
        assert_eq!(complete(b"DEL key"), Command::Invalid);
    }

    #[test]
    fn test_partial_commands_are_incomplete() {
        assert_eq!(Command::parse(b"SE"), Parsed::Incomplete);
        assert_eq!(Command::parse(b"SET"), Parsed::Incomplete);
        assert_eq!(Command::parse(b"SET "), Parsed::Incomplete);
        assert_eq!(Command::parse(b"SET user:1"), Parsed::Incomplete);
        assert_eq!(Command::parse(b"  GET  "), Parsed::Incomplete);
    }

    #[test]
    fn test_delimiter_only_input_is_invalid() {
        assert_eq!(complete(b""), Command::Invalid);
        assert_eq!(complete(b"    "), Command::Invalid);
    }

    #[test]
    fn test_terminated_line_completes_command() {
        assert_eq!(complete(b"GET\r\n"), Command::Invalid);
        assert_eq!(complete(b"SET user:1\n"), Command::Invalid);
        assert_eq!(
            complete(b"GET user:1\r\n"),
            Command::Get {
                key: "user:1".to_string()
            }
        );
    }

    #[test]
    fn test_terminator_only_input_is_blank() {
        assert_eq!(Command::parse(b"\r\n"), Parsed::Blank);
        assert_eq!(Command::parse(b"\n"), Parsed::Blank);
        assert_eq!(Command::parse(b"\r"), Parsed::Blank);
    }

    #[test]
    fn test_bare_carriage_return_waits_for_newline() {
        assert_eq!(Command::parse(b"GET k\r"), Parsed::Incomplete);
        assert_eq!(
            complete(b"GET k\r\n"),
            Command::Get {
                key: "k".to_string()
            }
        );
    }

    #[test]
    fn test_value_extra_tokens_dropped() {
        assert_eq!(
            complete(b"SET k v1 v2"),
            Command::Set {
                key: "k".to_string(),
                value: Bytes::from("v1"),
            }
        );
    }

    #[test]
    fn test_non_utf8_key_is_invalid() {
        assert_eq!(complete(b"GET \xff\xfe"), Command::Invalid);
    }

    #[test]
    fn test_command_names() {
        assert_eq!(complete(b"GET k").name(), "GET");
        assert_eq!(Command::Invalid.name(), "INVALID");
        assert_eq!(complete(b"DELETE k").kind(), CommandKind::Delete);
    }
}
