//! Serialized response writes.
//!
//! Requests on a connection are processed concurrently and finish in any
//! order, but their responses share one byte stream. Every response goes
//! through a [`ResponseWriter`], which holds the codec's write half behind a
//! single async mutex:
//!
//! ```text
//! Request task 1 ─┐
//! Request task 2 ─┼─► Mutex<CodecWrite> ─► write header+body, flush ─► stream
//! Request task N ─┘
//! ```
//!
//! The lock is held until the frame is flushed, so two frames never
//! interleave. No other ordering exists between responses; the peer pairs
//! them with requests by `Header::seq`.
//!
//! A failed write leaves the codec closed. The writer raises a flag that the
//! read loop watches, so the connection stops reading and drains.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::codec::CodecWrite;
use crate::error::Result;
use crate::protocol::{Body, Format, Header};

/// Cloneable handle to a connection's write gate.
#[derive(Clone)]
pub struct ResponseWriter {
    inner: Arc<Mutex<Box<dyn CodecWrite>>>,
    format: Format,
    written: Arc<AtomicU64>,
    failed: Arc<watch::Sender<bool>>,
}

impl ResponseWriter {
    /// Wrap the write half of a codec.
    pub fn new(writer: Box<dyn CodecWrite>, format: Format) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
            format,
            written: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Format reply bodies must be encoded in.
    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Write one response frame, waiting for the gate.
    pub async fn send(&self, header: &Header, body: &Body) -> Result<()> {
        let mut writer = self.inner.lock().await;
        let result = writer.write(header, body).await;
        match &result {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(seq = header.seq, method = %header.service_method, "write response error: {}", e);
                self.failed.send_replace(true);
            }
        }
        result
    }

    /// Write an error response carrying the placeholder body.
    pub async fn send_error(&self, header: Header, message: impl Into<String>) -> Result<()> {
        let header = header.with_error(message);
        self.send(&header, &Body::invalid_request(self.format)).await
    }

    /// Number of frames written successfully so far.
    #[inline]
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Whether any write has failed.
    pub fn is_failed(&self) -> bool {
        *self.failed.borrow()
    }

    /// Resolves once a write has failed. Resolves at once if one already did.
    pub fn failed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.failed.subscribe();
        async move {
            // The sender lives as long as any clone of this writer.
            let dropped = rx.wait_for(|failed| *failed).await.is_err();
            if dropped {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Close the underlying stream once every writer is done with it.
    pub async fn close(&self) -> Result<()> {
        self.inner.lock().await.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{split_stream, CodecRegistry, StreamParts};
    use crate::error::QrpcError;
    use crate::protocol::MSGPACK_TYPE;

    fn writer_and_peer() -> (ResponseWriter, crate::codec::Codec) {
        let (a, b) = tokio::io::duplex(1024);
        let registry = CodecRegistry::new();
        let (ar, aw) = split_stream(a);
        let (br, bw) = split_stream(b);
        let ours = registry.build(MSGPACK_TYPE, StreamParts::new(ar, aw)).unwrap();
        let peer = registry.build(MSGPACK_TYPE, StreamParts::new(br, bw)).unwrap();
        let (_, write_half) = ours.into_split();
        (ResponseWriter::new(write_half, Format::MsgPack), peer)
    }

    #[tokio::test]
    async fn test_send_error_uses_placeholder() {
        let (writer, mut peer) = writer_and_peer();
        writer
            .send_error(Header::new("Foo.Sum", 9), "bad argument")
            .await
            .unwrap();

        let header = peer.read_header().await.unwrap();
        assert_eq!(header.seq, 9);
        assert_eq!(header.error, "bad argument");
        assert_eq!(peer.read_body().await.unwrap(), Body::invalid_request(Format::MsgPack));
        assert_eq!(writer.written(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_sends_do_not_interleave() {
        let (writer, mut peer) = writer_and_peer();
        // Bodies larger than the duplex buffer force every write to park mid-frame.
        let payload = "z".repeat(8 * 1024);

        let mut tasks = Vec::new();
        for seq in 0..16u64 {
            let writer = writer.clone();
            let payload = payload.clone();
            tasks.push(tokio::spawn(async move {
                let body = Body::encode(Format::MsgPack, &payload).unwrap();
                writer.send(&Header::new("Big.Reply", seq), &body).await
            }));
        }

        let mut seen = Vec::new();
        for _ in 0..16 {
            let header = peer.read_header().await.unwrap();
            let body: String = peer.read_body().await.unwrap().decode().unwrap();
            assert_eq!(body, payload);
            seen.push(header.seq);
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_failed_write_raises_flag() {
        let (writer, _peer) = writer_and_peer();
        assert!(!writer.is_failed());
        let waiter = tokio::spawn(writer.failed());

        // A JSON body cannot go out on a MessagePack codec.
        let body = Body::encode(Format::Json, &"wrong format").unwrap();
        assert!(writer.send(&Header::new("Foo.Sum", 0), &body).await.is_err());

        assert!(writer.is_failed());
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        // Later subscribers see the flag immediately.
        writer.failed().await;
        assert_eq!(writer.written(), 0);
    }

    #[tokio::test]
    async fn test_close_twice() {
        let (writer, _peer) = writer_and_peer();
        writer.close().await.unwrap();
        assert!(matches!(writer.close().await, Err(QrpcError::ConnectionClosed)));
        assert!(matches!(
            writer.send_error(Header::new("A.B", 0), "late").await,
            Err(QrpcError::ConnectionClosed)
        ));
    }
}
