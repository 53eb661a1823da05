//! Error types for qrpc.

use thiserror::Error;

/// Main error type for all qrpc operations.
#[derive(Debug, Error)]
pub enum QrpcError {
    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (handshake and JSON codec).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Handshake option carried the wrong magic number.
    #[error("invalid magic number {0:#x}")]
    InvalidMagicNumber(u32),

    /// Handshake option named a codec that is not registered.
    #[error("invalid msg type {0}")]
    UnknownCodec(String),

    /// A message announced more bytes than the configured limit.
    #[error("message of {size} bytes exceeds limit of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// Protocol error (malformed framing, mismatched formats, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No method registered under the given "Service.Method" name.
    #[error("can't find method {0}")]
    MethodNotFound(String),

    /// A service method failed; the message is sent to the peer verbatim.
    #[error("{0}")]
    Service(String),

    /// The peer answered a call with a non-empty error field.
    #[error("remote error: {0}")]
    Remote(String),

    /// Connection closed (peer hung up, or the codec was closed locally).
    #[error("Connection closed")]
    ConnectionClosed,
}

impl QrpcError {
    /// Whether this error means the stream ended rather than carried garbage.
    ///
    /// Covers a clean close at a message boundary and a close in the middle
    /// of a message.
    pub fn is_eof(&self) -> bool {
        match self {
            QrpcError::ConnectionClosed => true,
            QrpcError::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// Result type alias using QrpcError.
pub type Result<T> = std::result::Result<T, QrpcError>;
