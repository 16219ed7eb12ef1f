//! Reply Encoding
//!
//! Every reply is one of a handful of fixed byte strings, or the raw stored
//! payload for a successful `GET`.
//!
//! | Reply            | Bytes on the wire           |
//! |------------------|-----------------------------|
//! | `Ok`             | `OK\r\n`                    |
//! | `Nil`            | `(nil)\r\n`                 |
//! | `Error`          | `-ERR Unknown command\r\n`  |
//! | `Payload(bytes)` | the bytes, unframed         |

use bytes::Bytes;
use std::fmt;

/// Reply to a successful `SET` or `DELETE`.
pub const OK: &[u8] = b"OK\r\n";

/// Reply to a `GET` on a missing key.
pub const NIL: &[u8] = b"(nil)\r\n";

/// Reply to an unknown or malformed command.
pub const UNKNOWN_COMMAND: &[u8] = b"-ERR Unknown command\r\n";

/// A reply queued for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Nil,
    Error,
    /// The stored payload, sent as-is
    Payload(Bytes),
}

impl Reply {
    /// Returns the exact bytes to write to the socket.
    ///
    /// Fixed replies are static; payloads are a cheap `Bytes` clone.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Reply::Ok => Bytes::from_static(OK),
            Reply::Nil => Bytes::from_static(NIL),
            Reply::Error => Bytes::from_static(UNKNOWN_COMMAND),
            Reply::Payload(data) => data.clone(),
        }
    }

    /// Returns true for the generic error reply.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Error => write!(f, "-ERR Unknown command"),
            Reply::Payload(data) => write!(f, "{}", String::from_utf8_lossy(data)),
        }
    }
}
