//! Connection handshake.
//!
//! The very first bytes on a connection are one [`HandshakeOption`], always
//! as a single line of JSON regardless of the codec it selects:
//!
//! ```text
//! {"MagicNumber":12250030,"MsgType":"application/msgpack"}\n
//! ```
//!
//! The acceptor checks the magic number and resolves `MsgType` through the
//! [`CodecRegistry`]. Nothing is ever sent back: on success the connection
//! simply stays open, on failure it is closed.
//!
//! # Example
//!
//! ```ignore
//! use qrpc::codec::CodecRegistry;
//! use qrpc::handshake::{self, HandshakeOption};
//!
//! let registry = CodecRegistry::new();
//! let mut codec = handshake::connect(stream, &HandshakeOption::default(), &registry).await?;
//! ```

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::codec::{read_line, split_stream, Codec, CodecRegistry, StreamParts};
use crate::error::{QrpcError, Result};
use crate::protocol::{JSON_TYPE, MSGPACK_TYPE};

/// Fixed value identifying this protocol.
pub const MAGIC_NUMBER: u32 = 0x00ba_ebae;

/// Default upper bound for the option line, newline included (4 KiB).
pub const DEFAULT_MAX_OPTION_SIZE: usize = 4 * 1024;

/// The handshake record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeOption {
    /// Must equal [`MAGIC_NUMBER`].
    #[serde(rename = "MagicNumber")]
    pub magic_number: u32,
    /// Codec identifier, resolved through the codec registry.
    #[serde(rename = "MsgType")]
    pub msg_type: String,
}

impl HandshakeOption {
    /// Option selecting the given codec.
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            msg_type: msg_type.into(),
        }
    }

    /// Option selecting the MessagePack codec.
    pub fn msgpack() -> Self {
        Self::new(MSGPACK_TYPE)
    }

    /// Option selecting the JSON codec.
    pub fn json() -> Self {
        Self::new(JSON_TYPE)
    }

    /// Check the magic number.
    pub fn validate(&self) -> Result<()> {
        if self.magic_number != MAGIC_NUMBER {
            return Err(QrpcError::InvalidMagicNumber(self.magic_number));
        }
        Ok(())
    }
}

impl Default for HandshakeOption {
    fn default() -> Self {
        Self::msgpack()
    }
}

/// Read one option line of at most `max_size` bytes, newline included.
pub async fn read_option<R: AsyncBufRead + Unpin>(reader: &mut R, max_size: usize) -> Result<HandshakeOption> {
    let line = read_line(reader, max_size.saturating_sub(1)).await?;
    Ok(serde_json::from_slice(&line)?)
}

/// Write one option line and flush.
pub async fn write_option<W: AsyncWrite + Unpin>(writer: &mut W, option: &HandshakeOption) -> Result<()> {
    let mut line = serde_json::to_vec(option)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Server side: read and validate the option, then build the selected codec.
///
/// Bytes already buffered past the option stay with the codec.
pub async fn accept<S>(
    stream: S,
    registry: &CodecRegistry,
    max_option_size: usize,
    max_message_size: usize,
) -> Result<Codec>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = split_stream(stream);

    let option = read_option(&mut reader, max_option_size).await?;
    option.validate()?;

    registry.build(
        &option.msg_type,
        StreamParts::new(reader, writer).max_message_size(max_message_size),
    )
}

/// Client side: send the option, then build the selected codec.
pub async fn connect<S>(stream: S, option: &HandshakeOption, registry: &CodecRegistry) -> Result<Codec>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let constructor = registry
        .get(&option.msg_type)
        .ok_or_else(|| QrpcError::UnknownCodec(option.msg_type.clone()))?;

    let (reader, mut writer) = split_stream(stream);
    write_option(&mut writer, option).await?;

    Ok(constructor(StreamParts::new(reader, writer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DEFAULT_MAX_MESSAGE_SIZE;
    use crate::protocol::Format;
    use tokio::io::{AsyncReadExt, BufReader};

    #[test]
    fn test_default_option() {
        let opt = HandshakeOption::default();
        assert_eq!(opt.magic_number, 0xbaebae);
        assert_eq!(opt.msg_type, MSGPACK_TYPE);
        assert!(opt.validate().is_ok());
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_string(&HandshakeOption::json()).unwrap();
        assert_eq!(
            json,
            r#"{"MagicNumber":12250030,"MsgType":"application/json"}"#
        );
    }

    #[test]
    fn test_validate_rejects_wrong_magic() {
        let opt = HandshakeOption {
            magic_number: 0xdead,
            msg_type: MSGPACK_TYPE.into(),
        };
        assert!(matches!(opt.validate(), Err(QrpcError::InvalidMagicNumber(0xdead))));
    }

    #[tokio::test]
    async fn test_write_then_read_option() {
        let mut buf = Vec::new();
        write_option(&mut buf, &HandshakeOption::json()).await.unwrap();
        assert_eq!(buf.last(), Some(&b'\n'));

        let mut reader = BufReader::new(&buf[..]);
        let opt = read_option(&mut reader, DEFAULT_MAX_OPTION_SIZE).await.unwrap();
        assert_eq!(opt, HandshakeOption::json());
    }

    #[tokio::test]
    async fn test_read_option_malformed() {
        let mut reader = BufReader::new(&b"{\"MagicNumber\":\n"[..]);
        assert!(matches!(
            read_option(&mut reader, DEFAULT_MAX_OPTION_SIZE).await,
            Err(QrpcError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_read_option_oversized() {
        let line = format!("{}\n", "x".repeat(100));
        let mut reader = BufReader::new(line.as_bytes());
        assert!(matches!(
            read_option(&mut reader, 16).await,
            Err(QrpcError::MessageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_option_limit_counts_newline() {
        let line = format!("{}\n", serde_json::to_string(&HandshakeOption::json()).unwrap());

        let mut reader = BufReader::new(line.as_bytes());
        assert_eq!(read_option(&mut reader, line.len()).await.unwrap(), HandshakeOption::json());

        let mut reader = BufReader::new(line.as_bytes());
        assert!(matches!(
            read_option(&mut reader, line.len() - 1).await,
            Err(QrpcError::MessageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_accept_keeps_pipelined_bytes() {
        let (client, mut server_side) = tokio::io::duplex(4096);

        // Option and first frame arrive in a single write.
        let mut wire = Vec::new();
        write_option(&mut wire, &HandshakeOption::json()).await.unwrap();
        wire.extend_from_slice(b"{\"ServiceMethod\":\"Foo.Sum\",\"Seq\":0}\n\"hi\"\n");
        tokio::io::AsyncWriteExt::write_all(&mut server_side, &wire)
            .await
            .unwrap();

        let registry = CodecRegistry::new();
        let mut codec = accept(client, &registry, DEFAULT_MAX_OPTION_SIZE, DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap();
        assert_eq!(codec.format(), Format::Json);
        assert_eq!(codec.read_header().await.unwrap().seq, 0);
        let arg: String = codec.read_body().await.unwrap().decode().unwrap();
        assert_eq!(arg, "hi");
    }

    #[tokio::test]
    async fn test_accept_rejects_unknown_codec() {
        let (client, mut peer) = tokio::io::duplex(4096);
        write_option(&mut peer, &HandshakeOption::new("application/gob"))
            .await
            .unwrap();

        let registry = CodecRegistry::new();
        let err = accept(client, &registry, DEFAULT_MAX_OPTION_SIZE, DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, QrpcError::UnknownCodec(_)));

        // The acceptor dropped the stream without writing anything.
        let mut reply = Vec::new();
        peer.read_to_end(&mut reply).await.unwrap();
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_connect_rejects_unregistered_codec_locally() {
        let (client, _peer) = tokio::io::duplex(4096);
        let err = connect(client, &HandshakeOption::new("nope"), &CodecRegistry::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QrpcError::UnknownCodec(_)));
    }
}
