//! Text codec: newline-delimited JSON.
//!
//! Every message is one line of compact JSON:
//!
//! ```text
//! {"ServiceMethod":"Foo.Sum","Seq":0,"Error":""}\n
//! "qrpc req 0"\n
//! ```
//!
//! Compact JSON never contains a raw newline, so a line is always exactly one
//! message.

use super::framing::{read_line, StreamWriter};
use super::{BoxRead, Codec, CodecRead, CodecWrite, StreamParts};
use crate::error::{QrpcError, Result};
use crate::protocol::{Body, Format, Header};
use crate::BoxFuture;

/// Build a JSON codec over a connection.
pub fn new_codec(parts: StreamParts) -> Codec {
    Codec::new(
        Box::new(JsonReader {
            reader: parts.reader,
            max_message_size: parts.max_message_size,
        }),
        Box::new(JsonWriter {
            stream: StreamWriter::new(parts.writer),
        }),
    )
}

/// Read half of the JSON codec.
pub struct JsonReader {
    reader: BoxRead,
    max_message_size: usize,
}

impl CodecRead for JsonReader {
    fn format(&self) -> Format {
        Format::Json
    }

    fn read_header(&mut self) -> BoxFuture<'_, Result<Header>> {
        Box::pin(async move {
            let line = read_line(&mut self.reader, self.max_message_size).await?;
            Format::Json.decode(&line)
        })
    }

    fn read_body(&mut self) -> BoxFuture<'_, Result<Body>> {
        Box::pin(async move {
            let line = read_line(&mut self.reader, self.max_message_size).await?;
            Ok(Body::from_bytes(Format::Json, line))
        })
    }
}

/// Write half of the JSON codec.
pub struct JsonWriter {
    stream: StreamWriter,
}

impl JsonWriter {
    fn encode_header(header: &Header, body: &Body) -> Result<Vec<u8>> {
        if body.format() != Format::Json {
            return Err(QrpcError::Protocol(format!(
                "cannot write {:?} body with json codec",
                body.format()
            )));
        }
        if body.as_bytes().contains(&b'\n') {
            return Err(QrpcError::Protocol("json body spans multiple lines".into()));
        }
        let mut line = Format::Json.encode(header)?;
        line.push(b'\n');
        Ok(line)
    }
}

impl CodecWrite for JsonWriter {
    fn write<'a>(&'a mut self, header: &'a Header, body: &'a Body) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let head = match Self::encode_header(header, body) {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(seq = header.seq, "json codec: error encoding frame: {}", e);
                    self.stream.abort().await;
                    return Err(e);
                }
            };
            self.stream
                .write_frame(&[&head, body.as_bytes(), b"\n"])
                .await
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.stream.close())
    }
}
