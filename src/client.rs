//! Synchronous-style client.
//!
//! One call at a time: write the request, then read its header and body.
//! Sequence numbers are assigned from zero upward per connection.
//!
//! # Example
//!
//! ```ignore
//! use qrpc::{Client, HandshakeOption};
//!
//! #[tokio::main]
//! async fn main() -> qrpc::Result<()> {
//!     let mut client = Client::dial("127.0.0.1:9999", &HandshakeOption::default()).await?;
//!     let sum: i64 = client.call("Arith.Add", &(1, 2)).await?;
//!     client.close().await
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::codec::{Codec, CodecRegistry};
use crate::error::{QrpcError, Result};
use crate::handshake::{self, HandshakeOption};
use crate::protocol::{Body, Format, Header};

/// A client connection that has sent its handshake option.
#[derive(Debug)]
pub struct Client {
    codec: Codec,
    next_seq: u64,
}

impl Client {
    /// Handshake over an existing stream using the built-in codecs.
    pub async fn connect<S>(stream: S, option: &HandshakeOption) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::connect_with(stream, option, &CodecRegistry::new()).await
    }

    /// Handshake over an existing stream, resolving the codec in `registry`.
    pub async fn connect_with<S>(stream: S, option: &HandshakeOption, registry: &CodecRegistry) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = handshake::connect(stream, option, registry).await?;
        tracing::debug!(codec = %option.msg_type, "client connected");
        Ok(Self { codec, next_seq: 0 })
    }

    /// Open a TCP connection and handshake.
    pub async fn dial<A: ToSocketAddrs>(addr: A, option: &HandshakeOption) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Self::connect(stream, option).await
    }

    /// Format request arguments are encoded in.
    #[inline]
    pub fn format(&self) -> Format {
        self.codec.format()
    }

    /// Sequence number the next call will use.
    #[inline]
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Call `method` and wait for its reply.
    ///
    /// A reply whose header carries an error becomes [`QrpcError::Remote`].
    pub async fn call<A, R>(&mut self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = Body::encode(self.codec.format(), args)?;
        self.call_raw(method, &body).await?.decode()
    }

    /// Call with a pre-encoded argument body.
    pub async fn call_raw(&mut self, method: &str, body: &Body) -> Result<Body> {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.codec.write(&Header::new(method, seq), body).await?;

        let header = self.codec.read_header().await?;
        // The body is always present, even on error.
        let reply = self.codec.read_body().await?;

        if header.seq != seq {
            return Err(QrpcError::Protocol(format!(
                "reply seq {} does not match request seq {}",
                header.seq, seq
            )));
        }
        if header.is_error() {
            return Err(QrpcError::Remote(header.error));
        }
        Ok(reply)
    }

    /// Access the underlying codec for raw framing.
    pub fn codec_mut(&mut self) -> &mut Codec {
        &mut self.codec
    }

    /// Shut down the connection. Closing twice returns `ConnectionClosed`.
    pub async fn close(&mut self) -> Result<()> {
        self.codec.close().await
    }
}
