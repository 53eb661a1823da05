//! Value encodings and the opaque call body.
//!
//! The transport never looks inside a body. It reads the encoded bytes of one
//! message and hands them on as a [`Body`]; whoever knows the argument type
//! (the service registry) decodes it.
//!
//! **MsgPack**: always `to_vec_named`, never `to_vec`. Structs go on the wire
//! as maps with field names so that peers in other languages can read them.
//!
//! # Example
//!
//! ```
//! use qrpc::protocol::{Body, Format};
//!
//! let body = Body::encode(Format::MsgPack, &"hello").unwrap();
//! let decoded: String = body.decode().unwrap();
//! assert_eq!(decoded, "hello");
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Codec identifier for the binary variant.
pub const MSGPACK_TYPE: &str = "application/msgpack";

/// Codec identifier for the text variant.
pub const JSON_TYPE: &str = "application/json";

/// How values are serialized inside a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// MessagePack, structs as maps.
    MsgPack,
    /// Compact JSON.
    Json,
}

impl Format {
    /// The codec identifier this format is registered under by default.
    pub fn codec_type(self) -> &'static str {
        match self {
            Format::MsgPack => MSGPACK_TYPE,
            Format::Json => JSON_TYPE,
        }
    }

    /// Serialize a value.
    #[inline]
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            // CRITICAL: to_vec_named, NOT to_vec!
            Format::MsgPack => Ok(rmp_serde::to_vec_named(value)?),
            Format::Json => Ok(serde_json::to_vec(value)?),
        }
    }

    /// Deserialize a value.
    #[inline]
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            Format::MsgPack => Ok(rmp_serde::from_slice(bytes)?),
            Format::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }
}

/// Body sent in place of a reply when a call fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidRequest {}

/// Encoded bytes of one request argument or one reply, tagged with their format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    format: Format,
    bytes: Bytes,
}

impl Body {
    /// Wrap bytes that are already encoded in `format`.
    pub fn from_bytes(format: Format, bytes: impl Into<Bytes>) -> Self {
        Self {
            format,
            bytes: bytes.into(),
        }
    }

    /// Encode a value.
    pub fn encode<T: Serialize + ?Sized>(format: Format, value: &T) -> Result<Self> {
        Ok(Self::from_bytes(format, format.encode(value)?))
    }

    /// The fixed placeholder body that accompanies an error response.
    pub fn invalid_request(format: Format) -> Self {
        let bytes: &'static [u8] = match format {
            Format::MsgPack => &[0x80],
            Format::Json => b"{}",
        };
        Self::from_bytes(format, Bytes::from_static(bytes))
    }

    /// Decode into the caller's type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        self.format.decode(&self.bytes)
    }

    /// Format the bytes are encoded in.
    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Raw encoded bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of encoded bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether there are no encoded bytes at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
