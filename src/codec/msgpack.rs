//! Binary codec: length-prefixed MessagePack.
//!
//! Every message (a header or a body) is framed as:
//!
//! ```text
//! ┌────────────┬──────────────────────┐
//! │ Length     │ MessagePack bytes    │
//! │ u32 BE     │ `Length` bytes       │
//! └────────────┴──────────────────────┘
//! ```
//!
//! Headers are encoded with `to_vec_named`, so they are maps keyed by
//! `ServiceMethod`, `Seq` and `Error`.

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use super::framing::{ensure_more, skip_exact, StreamWriter};
use super::{BoxRead, Codec, CodecRead, CodecWrite, StreamParts};
use crate::error::{QrpcError, Result};
use crate::protocol::{Body, Format, Header};
use crate::BoxFuture;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Build a MessagePack codec over a connection.
pub fn new_codec(parts: StreamParts) -> Codec {
    Codec::new(
        Box::new(MsgPackReader {
            reader: parts.reader,
            max_message_size: parts.max_message_size,
        }),
        Box::new(MsgPackWriter {
            stream: StreamWriter::new(parts.writer),
        }),
    )
}

/// Read half of the MessagePack codec.
pub struct MsgPackReader {
    reader: BoxRead,
    max_message_size: usize,
}

impl MsgPackReader {
    async fn read_message(&mut self) -> Result<Bytes> {
        ensure_more(&mut self.reader).await?;

        let len = self.reader.read_u32().await? as usize;
        if len > self.max_message_size {
            skip_exact(&mut self.reader, len).await?;
            return Err(QrpcError::MessageTooLarge {
                size: len,
                max: self.max_message_size,
            });
        }

        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

impl CodecRead for MsgPackReader {
    fn format(&self) -> Format {
        Format::MsgPack
    }

    fn read_header(&mut self) -> BoxFuture<'_, Result<Header>> {
        Box::pin(async move {
            let message = self.read_message().await?;
            Format::MsgPack.decode(&message)
        })
    }

    fn read_body(&mut self) -> BoxFuture<'_, Result<Body>> {
        Box::pin(async move {
            let message = self.read_message().await?;
            Ok(Body::from_bytes(Format::MsgPack, message))
        })
    }
}

/// Write half of the MessagePack codec.
pub struct MsgPackWriter {
    stream: StreamWriter,
}

impl MsgPackWriter {
    fn encode_frame(header: &Header, body: &Body) -> Result<(Vec<u8>, [u8; LENGTH_PREFIX_SIZE])> {
        if body.format() != Format::MsgPack {
            return Err(QrpcError::Protocol(format!(
                "cannot write {:?} body with msgpack codec",
                body.format()
            )));
        }
        let header_bytes = Format::MsgPack.encode(header)?;
        let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + header_bytes.len());
        frame.extend_from_slice(&length_prefix(header_bytes.len())?);
        frame.extend_from_slice(&header_bytes);
        Ok((frame, length_prefix(body.len())?))
    }
}

fn length_prefix(len: usize) -> Result<[u8; LENGTH_PREFIX_SIZE]> {
    let len = u32::try_from(len)
        .map_err(|_| QrpcError::Protocol(format!("message of {len} bytes cannot be framed")))?;
    Ok(len.to_be_bytes())
}

impl CodecWrite for MsgPackWriter {
    fn write<'a>(&'a mut self, header: &'a Header, body: &'a Body) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (head, body_len) = match Self::encode_frame(header, body) {
                Ok(parts) => parts,
                Err(e) => {
                    tracing::error!(seq = header.seq, "msgpack codec: error encoding frame: {}", e);
                    self.stream.abort().await;
                    return Err(e);
                }
            };
            self.stream
                .write_frame(&[&head, &body_len, body.as_bytes()])
                .await
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.stream.close())
    }
}
