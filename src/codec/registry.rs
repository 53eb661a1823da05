//! Codec registry: runtime codec identifier → constructor.
//!
//! Built once at startup and shared with every connection. The built-in
//! variants are registered by [`CodecRegistry::new`].
//!
//! # Example
//!
//! ```
//! use qrpc::codec::{json, CodecRegistry};
//!
//! let mut registry = CodecRegistry::new();
//! registry.register("text/x-qrpc", json::new_codec);
//! assert!(registry.contains("application/msgpack"));
//! assert!(registry.contains("text/x-qrpc"));
//! ```

use std::collections::HashMap;

use super::{json, msgpack, BoxRead, BoxWrite, Codec};
use crate::error::{QrpcError, Result};
use crate::protocol::{JSON_TYPE, MSGPACK_TYPE};

/// Default maximum size of one encoded header or body (64 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Everything a codec constructor binds to.
pub struct StreamParts {
    /// Buffered read half.
    pub reader: BoxRead,
    /// Write half.
    pub writer: BoxWrite,
    /// Largest single message the codec will accept.
    pub max_message_size: usize,
}

impl StreamParts {
    /// Bundle the halves with the default message size limit.
    pub fn new(reader: BoxRead, writer: BoxWrite) -> Self {
        Self {
            reader,
            writer,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Override the message size limit.
    pub fn max_message_size(mut self, limit: usize) -> Self {
        self.max_message_size = limit;
        self
    }
}

/// Constructor for a codec variant.
pub type NewCodecFn = fn(StreamParts) -> Codec;

/// Registry mapping codec identifiers to constructors.
#[derive(Clone)]
pub struct CodecRegistry {
    constructors: HashMap<String, NewCodecFn>,
}

impl CodecRegistry {
    /// Registry with the built-in MessagePack and JSON variants.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(MSGPACK_TYPE, msgpack::new_codec);
        registry.register(JSON_TYPE, json::new_codec);
        registry
    }

    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) a codec variant.
    pub fn register(&mut self, codec_type: &str, constructor: NewCodecFn) {
        self.constructors.insert(codec_type.to_string(), constructor);
    }

    /// Look up a constructor.
    pub fn get(&self, codec_type: &str) -> Option<NewCodecFn> {
        self.constructors.get(codec_type).copied()
    }

    /// Whether a codec identifier is registered.
    pub fn contains(&self, codec_type: &str) -> bool {
        self.constructors.contains_key(codec_type)
    }

    /// Registered identifiers, in no particular order.
    pub fn codec_types(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Construct the named codec over a connection.
    pub fn build(&self, codec_type: &str, parts: StreamParts) -> Result<Codec> {
        let constructor = self
            .get(codec_type)
            .ok_or_else(|| QrpcError::UnknownCodec(codec_type.to_string()))?;
        Ok(constructor(parts))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codec_types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
