//! Codec module - per-connection encoding of headers and bodies.
//!
//! A [`Codec`] is bound to exactly one byte stream. It can read a header, read
//! a body and write a header+body pair as one flushed frame. Two variants are
//! built in:
//!
//! - [`msgpack`] - length-prefixed MessagePack (`application/msgpack`)
//! - [`json`] - newline-delimited JSON (`application/json`)
//!
//! The variant for a connection is picked at runtime by the handshake through
//! a [`CodecRegistry`].
//!
//! # Design
//!
//! The read side and the write side are separate capabilities
//! ([`CodecRead`], [`CodecWrite`]). The connection pipeline splits a codec
//! so its single read loop owns the read half while the write half sits
//! behind the connection's write gate. A codec is not safe for concurrent
//! writes on its own; callers serialize writes.
//!
//! # Example
//!
//! ```ignore
//! use qrpc::codec::{split_stream, CodecRegistry, StreamParts};
//! use qrpc::protocol::{Body, Header, MSGPACK_TYPE};
//!
//! let (reader, writer) = split_stream(stream);
//! let mut codec = CodecRegistry::new().build(MSGPACK_TYPE, StreamParts::new(reader, writer))?;
//! codec.write(&Header::new("Foo.Sum", 0), &Body::encode(codec.format(), &"hi")?).await?;
//! ```

mod framing;
pub mod json;
pub mod msgpack;
mod registry;

pub(crate) use framing::read_line;
pub use registry::{CodecRegistry, NewCodecFn, StreamParts, DEFAULT_MAX_MESSAGE_SIZE};

use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use crate::error::{QrpcError, Result};
use crate::protocol::{Body, Format, Header};
use crate::BoxFuture;

/// Buffered read half of a connection.
pub type BoxRead = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

/// Write half of a connection.
pub type BoxWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Split any async stream into the halves a codec is built from.
pub fn split_stream<S>(stream: S) -> (BoxRead, BoxWrite)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (r, w) = tokio::io::split(stream);
    let r: Box<dyn AsyncRead + Send + Unpin> = Box::new(r);
    (BufReader::new(r), Box::new(w))
}

/// Read side of a codec.
pub trait CodecRead: Send {
    /// Value encoding used by this codec.
    fn format(&self) -> Format;

    /// Read the next header.
    ///
    /// Returns `ConnectionClosed` when the peer closed cleanly before a new
    /// message, and a decode error when the bytes are not a header.
    fn read_header(&mut self) -> BoxFuture<'_, Result<Header>>;

    /// Read the next body without interpreting it.
    fn read_body(&mut self) -> BoxFuture<'_, Result<Body>>;
}

/// Write side of a codec.
pub trait CodecWrite: Send {
    /// Encode header then body as one frame and flush.
    ///
    /// Any encode or I/O failure shuts the stream down; later writes return
    /// `ConnectionClosed`.
    fn write<'a>(&'a mut self, header: &'a Header, body: &'a Body) -> BoxFuture<'a, Result<()>>;

    /// Release the stream. Closing twice returns `ConnectionClosed`.
    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

/// A codec bound to one connection.
pub struct Codec {
    reader: Box<dyn CodecRead>,
    writer: Box<dyn CodecWrite>,
    closed: bool,
}

impl Codec {
    /// Pair a read half and a write half.
    pub fn new(reader: Box<dyn CodecRead>, writer: Box<dyn CodecWrite>) -> Self {
        Self {
            reader,
            writer,
            closed: false,
        }
    }

    /// Value encoding used by this codec.
    pub fn format(&self) -> Format {
        self.reader.format()
    }

    /// Read the next header.
    pub async fn read_header(&mut self) -> Result<Header> {
        if self.closed {
            return Err(QrpcError::ConnectionClosed);
        }
        self.reader.read_header().await
    }

    /// Read the next body.
    pub async fn read_body(&mut self) -> Result<Body> {
        if self.closed {
            return Err(QrpcError::ConnectionClosed);
        }
        self.reader.read_body().await
    }

    /// Write one frame. Not to be called concurrently; `&mut self` enforces it.
    pub async fn write(&mut self, header: &Header, body: &Body) -> Result<()> {
        if self.closed {
            return Err(QrpcError::ConnectionClosed);
        }
        self.writer.write(header, body).await
    }

    /// Close the stream. A second call returns `ConnectionClosed`.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(QrpcError::ConnectionClosed);
        }
        self.closed = true;
        self.writer.close().await
    }

    /// Split into independently owned halves.
    pub fn into_split(self) -> (Box<dyn CodecRead>, Box<dyn CodecWrite>) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("format", &self.format())
            .field("closed", &self.closed)
            .finish()
    }
}
