//! Value Codecs
//!
//! A `SET` value passes through a codec before it reaches the store. The
//! codec decodes the raw bytes into a record (rejecting payloads it does
//! not understand) and encodes the record into the bytes that get stored
//! and later returned by `GET`.
//!
//! Two codecs ship with LineKV:
//!
//! - [`RawCodec`]: stores the value bytes unchanged
//! - [`JsonCodec<UserProfile>`]: accepts a JSON user profile such as
//!   `{"Id":1,"Username":"John"}` and stores its canonical JSON encoding

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while decoding or encoding a value.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload could not be decoded into a record
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The record could not be encoded
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Converts between wire bytes and a typed record.
pub trait ValueCodec: Send + Sync {
    /// The record type this codec understands.
    type Record;

    /// Decodes raw value bytes into a record.
    fn decode(&self, raw: &[u8]) -> Result<Self::Record, CodecError>;

    /// Encodes a record into the bytes that get stored.
    fn encode(&self, record: &Self::Record) -> Result<Bytes, CodecError>;
}

/// Object-safe view of a codec, used by the command handler.
///
/// Every [`ValueCodec`] gets this for free: the raw bytes are decoded and
/// re-encoded, so only well-formed records reach the store.
pub trait PayloadCodec: Send + Sync {
    /// Returns the bytes to store for a raw `SET` value.
    fn to_stored(&self, raw: &[u8]) -> Result<Bytes, CodecError>;

    /// Codec name, for logging.
    fn name(&self) -> &'static str;
}

impl<C> PayloadCodec for C
where
    C: ValueCodec + NamedCodec,
{
    fn to_stored(&self, raw: &[u8]) -> Result<Bytes, CodecError> {
        let record = self.decode(raw)?;
        self.encode(&record)
    }

    fn name(&self) -> &'static str {
        C::NAME
    }
}

/// Gives a codec a stable name.
pub trait NamedCodec {
    const NAME: &'static str;
}

/// Passthrough codec: the record is the byte string itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl ValueCodec for RawCodec {
    type Record = Bytes;

    fn decode(&self, raw: &[u8]) -> Result<Bytes, CodecError> {
        Ok(Bytes::copy_from_slice(raw))
    }

    fn encode(&self, record: &Bytes) -> Result<Bytes, CodecError> {
        Ok(record.clone())
    }
}

impl NamedCodec for RawCodec {
    const NAME: &'static str = "raw";
}

/// JSON codec for any serde record type.
pub struct JsonCodec<T> {
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec")
            .field("record", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> ValueCodec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Record = T;

    fn decode(&self, raw: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(raw).map_err(|e| CodecError::InvalidPayload(e.to_string()))
    }

    fn encode(&self, record: &T) -> Result<Bytes, CodecError> {
        serde_json::to_vec(record)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }
}

impl NamedCodec for JsonCodec<UserProfile> {
    const NAME: &'static str = "profile";
}

/// A user profile record, as sent by clients in `SET` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Selects the codec applied to `SET` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CodecKind {
    /// Store values unchanged
    #[default]
    Raw,
    /// Require JSON user profiles
    Profile,
}

impl CodecKind {
    /// Builds the codec for this kind.
    pub fn build(self) -> Box<dyn PayloadCodec> {
        match self {
            CodecKind::Raw => Box::new(RawCodec),
            CodecKind::Profile => Box::new(JsonCodec::<UserProfile>::new()),
        }
    }
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(CodecKind::Raw),
            "profile" | "json" => Ok(CodecKind::Profile),
            other => Err(format!("unknown codec '{}' (expected raw or profile)", other)),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecKind::Raw => write!(f, "raw"),
            CodecKind::Profile => write!(f, "profile"),
        }
    }
}
