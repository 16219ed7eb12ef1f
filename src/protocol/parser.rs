//! Zero-Copy Command Tokenizer
//!
//! This module splits a raw command line into its three fields:
//! the command name, the key and the value.
//!
//! ## How the Tokenizer Works
//!
//! Starting at offset 0, the tokenizer repeatedly:
//!
//! 1. Skips any run of delimiter bytes
//! 2. Scans forward to the next delimiter (or the end of the buffer)
//! 3. Returns the span in between as one token
//!
//! This is done exactly three times. Anything after the third token is
//! dropped, so `SET user:1 data extra words` yields the value `data`.
//!
//! ```text
//!   "   SET   user:1   data   extra"
//!       ^^^   ^^^^^^   ^^^^   ~~~~~ (discarded)
//!       name   key     value
//! ```
//!
//! The returned fields are slices into the caller's buffer. Nothing is
//! copied or allocated, and the borrow checker keeps the views from
//! outliving the next mutation of the buffer.

/// The delimiter used by the wire protocol (ASCII space).
pub const SPACE: u8 = b' ';

/// The result of tokenizing one command: `(name, key, value)`.
///
/// A triple with an empty `name` is invalid and always has an empty
/// `key` and `value` as well.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandParts<'a> {
    /// The command name (e.g. `SET`)
    pub name: &'a [u8],
    /// The key the command operates on
    pub key: &'a [u8],
    /// The value (only meaningful for `SET`)
    pub value: &'a [u8],
}

impl<'a> CommandParts<'a> {
    /// Returns true if this triple carries a command name.
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }
}

impl std::fmt::Display for CommandParts<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.is_valid() {
            return Ok(());
        }

        write!(f, "{}", String::from_utf8_lossy(self.name))?;
        for part in [self.key, self.value] {
            if !part.is_empty() {
                write!(f, " {}", String::from_utf8_lossy(part))?;
            }
        }
        Ok(())
    }
}

/// Splits `buf` into a command triple using `delimiter`.
///
/// Returns an invalid (all-empty) triple when the buffer has no name
/// token or no key token.
///
/// # Example
///
/// ```
/// use linekv::protocol::parser::{parse, SPACE};
///
/// let parts = parse(b"  SET  user:1  data", SPACE);
/// assert_eq!(parts.name, b"SET");
/// assert_eq!(parts.key, b"user:1");
/// assert_eq!(parts.value, b"data");
/// ```
pub fn parse(buf: &[u8], delimiter: u8) -> CommandParts<'_> {
    let (name, rest) = next_token(buf, delimiter);
    let (key, rest) = next_token(rest, delimiter);
    if name.is_empty() || key.is_empty() {
        return CommandParts::default();
    }

    let (value, _discarded) = next_token(rest, delimiter);

    CommandParts { name, key, value }
}

/// Extracts one token, returning it with the unscanned remainder.
#[inline]
fn next_token(buf: &[u8], delimiter: u8) -> (&[u8], &[u8]) {
    let start = buf
        .iter()
        .position(|&b| b != delimiter)
        .unwrap_or(buf.len());
    let buf = &buf[start..];

    let end = buf
        .iter()
        .position(|&b| b == delimiter)
        .unwrap_or(buf.len());

    buf.split_at(end)
}
