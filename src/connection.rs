//! Per-connection message pipeline.
//!
//! The handshake runs before a [`Connection`] exists, in
//! [`Server::serve_conn`](crate::Server::serve_conn). The full lifecycle is:
//!
//! ```text
//! Handshaking ──ok──► Processing ──read or write fails──► Draining ──► Closed
//!      │                                                                ▲
//!      └─────────────────────────── handshake fails ────────────────────┘
//! ```
//!
//! - **Handshaking**: owned by the server; a `Connection` is created only
//!   once it succeeds.
//! - **Processing**: one sequential read loop. Each header+body pair is
//!   handed to the [`Dispatcher`]; a successful lookup spawns one task per
//!   request, a failed one is answered immediately with an error response.
//!   A failed header read or a failed response write leaves this state.
//! - **Draining**: waits for every spawned request task to finish writing
//!   its response. Nothing new is read.
//! - **Closed**: the write half is shut down and the read half dropped.
//!
//! There is no limit on how many request tasks may be in flight at once.

use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use crate::codec::{Codec, CodecRead};
use crate::error::QrpcError;
use crate::handler::{Dispatcher, Invocation};
use crate::protocol::Header;
use crate::writer::ResponseWriter;

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Waiting for the handshake option.
    Handshaking,
    /// Reading requests and dispatching them.
    Processing,
    /// Waiting for in-flight requests to respond.
    Draining,
    /// Stream released.
    Closed,
}

/// Counters collected over the life of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Headers read successfully.
    pub requests: u64,
    /// Requests answered from the read loop because lookup or decoding failed.
    pub rejected: u64,
    /// Response frames written successfully.
    pub responses: u64,
    /// Highest number of request tasks alive at once.
    pub peak_in_flight: usize,
}

/// A connection that finished its handshake.
pub struct Connection {
    reader: Box<dyn CodecRead>,
    writer: ResponseWriter,
    dispatcher: Arc<dyn Dispatcher>,
    tasks: JoinSet<()>,
    state: ConnectionState,
    stats: ConnectionStats,
}

impl Connection {
    /// Take ownership of a negotiated codec.
    pub fn new(codec: Codec, dispatcher: Arc<dyn Dispatcher>) -> Self {
        let format = codec.format();
        let (reader, writer) = codec.into_split();
        Self {
            reader,
            writer: ResponseWriter::new(writer, format),
            dispatcher,
            tasks: JoinSet::new(),
            state: ConnectionState::Processing,
            stats: ConnectionStats::default(),
        }
    }

    /// Serve until the peer stops sending, then drain and close.
    pub async fn run(mut self) -> ConnectionStats {
        self.process().await;

        self.transition(ConnectionState::Draining);
        self.drain().await;

        match self.writer.close().await {
            Ok(()) | Err(QrpcError::ConnectionClosed) => {}
            Err(e) => tracing::debug!("close error: {}", e),
        }
        self.transition(ConnectionState::Closed);

        self.stats.responses = self.writer.written();
        self.stats
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Counters collected so far.
    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    fn transition(&mut self, next: ConnectionState) {
        debug_assert!(next > self.state, "{:?} -> {:?}", self.state, next);
        tracing::debug!(from = ?self.state, to = ?next, in_flight = self.tasks.len(), "connection state");
        self.state = next;
    }

    async fn process(&mut self) {
        loop {
            let read = tokio::select! {
                biased;
                _ = self.writer.failed() => {
                    tracing::warn!("response write failed, stop reading");
                    return;
                }
                read = self.reader.read_header() => read,
            };
            let header = match read {
                Ok(header) => header,
                Err(e) if e.is_eof() => return,
                Err(e) => {
                    tracing::warn!("read header error: {}", e);
                    return;
                }
            };
            self.stats.requests += 1;

            let prepared = match self.reader.read_body().await {
                Ok(body) => self.dispatcher.prepare(&header, body),
                Err(e) => Err(e),
            };

            match prepared {
                Ok(invocation) => self.spawn_request(header, invocation),
                Err(e) => {
                    tracing::warn!(seq = header.seq, method = %header.service_method, "read argv error: {}", e);
                    self.stats.rejected += 1;
                    // Write failures are logged by the writer and end the
                    // loop through its failure flag.
                    let _ = self.writer.send_error(header, e.to_string()).await;
                }
            }

            self.reap();
        }
    }

    fn spawn_request(&mut self, header: Header, invocation: Invocation) {
        let writer = self.writer.clone();
        self.tasks.spawn(
            async move {
                let _ = match invocation.await {
                    Ok(reply) => writer.send(&header, &reply).await,
                    Err(e) => writer.send_error(header, e.to_string()).await,
                };
            }
            .in_current_span(),
        );
        self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.tasks.len());
    }

    /// Collect request tasks that already finished.
    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            log_join(result);
        }
    }

    async fn drain(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            log_join(result);
        }
    }
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!("request task panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{split_stream, CodecRegistry, StreamParts};
    use crate::handler::{Placeholder, ServiceRegistry};
    use crate::protocol::{Body, Format, JSON_TYPE, MSGPACK_TYPE};

    fn connected(codec_type: &str, dispatcher: Arc<dyn Dispatcher>) -> (Connection, Codec) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let registry = CodecRegistry::new();
        let (ar, aw) = split_stream(a);
        let (br, bw) = split_stream(b);
        let server = registry.build(codec_type, StreamParts::new(ar, aw)).unwrap();
        let client = registry.build(codec_type, StreamParts::new(br, bw)).unwrap();
        (Connection::new(server, dispatcher), client)
    }

    #[tokio::test]
    async fn test_placeholder_round_trips_and_drains() {
        for codec_type in [MSGPACK_TYPE, JSON_TYPE] {
            let (conn, mut client) = connected(codec_type, Arc::new(Placeholder));
            let server = tokio::spawn(conn.run());

            for seq in 0..5u64 {
                let body = Body::encode(client.format(), &format!("qrpc req {seq}")).unwrap();
                client.write(&Header::new("Foo.Sum", seq), &body).await.unwrap();
                let header = client.read_header().await.unwrap();
                assert_eq!(header.seq, seq);
                assert!(header.error.is_empty());
                let reply: String = client.read_body().await.unwrap().decode().unwrap();
                assert_eq!(reply, format!("qrpc resp {seq}"));
            }

            let (mut reader, mut writer) = client.into_split();
            writer.close().await.unwrap();
            let stats = server.await.unwrap();
            assert_eq!(stats.requests, 5);
            assert_eq!(stats.responses, 5);
            assert_eq!(stats.rejected, 0);

            // Server closed its side after draining.
            assert!(reader.read_header().await.unwrap_err().is_eof());
        }
    }

    #[tokio::test]
    async fn test_unknown_method_is_answered_and_connection_survives() {
        let mut registry = ServiceRegistry::new();
        registry.register("Echo.Say", |s: String| async move { Ok(s) });
        let (conn, mut client) = connected(MSGPACK_TYPE, Arc::new(registry));
        let server = tokio::spawn(conn.run());

        let body = Body::encode(client.format(), &"hi").unwrap();
        client.write(&Header::new("Echo.Shout", 1), &body).await.unwrap();
        let header = client.read_header().await.unwrap();
        assert_eq!(header.seq, 1);
        assert_eq!(header.error, "can't find method Echo.Shout");
        client.read_body().await.unwrap();

        client.write(&Header::new("Echo.Say", 2), &body).await.unwrap();
        let header = client.read_header().await.unwrap();
        assert_eq!(header.seq, 2);
        assert!(header.error.is_empty());
        assert_eq!(client.read_body().await.unwrap().decode::<String>().unwrap(), "hi");

        client.close().await.unwrap();
        let stats = server.await.unwrap();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.responses, 2);
    }

    #[tokio::test]
    async fn test_drain_waits_for_slow_requests() {
        let mut registry = ServiceRegistry::new();
        registry.register("Slow.Echo", |n: u64| async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(n)
        });
        let (conn, mut client) = connected(JSON_TYPE, Arc::new(registry));
        let server = tokio::spawn(conn.run());

        for seq in 0..3u64 {
            let body = Body::encode(client.format(), &seq).unwrap();
            client.write(&Header::new("Slow.Echo", seq), &body).await.unwrap();
        }
        // Stop sending before any reply exists; responses must still arrive.
        let (mut reader, mut writer) = client.into_split();
        writer.close().await.unwrap();

        let mut seqs = Vec::new();
        for _ in 0..3 {
            seqs.push(reader.read_header().await.unwrap().seq);
            reader.read_body().await.unwrap();
        }
        seqs.sort_unstable();
        assert_eq!(seqs, vec![0, 1, 2]);

        let stats = server.await.unwrap();
        assert_eq!(stats.responses, 3);
        assert_eq!(stats.peak_in_flight, 3);
    }

    /// Replies with a body in the wrong format so the codec cannot write it.
    struct WrongFormat;

    impl Dispatcher for WrongFormat {
        fn prepare(&self, _header: &Header, body: Body) -> crate::error::Result<Invocation> {
            let other = match body.format() {
                Format::MsgPack => Format::Json,
                Format::Json => Format::MsgPack,
            };
            Ok(Box::pin(async move { Body::encode(other, &"unwritable") }))
        }
    }

    #[tokio::test]
    async fn test_new_connection_is_processing() {
        let (conn, _client) = connected(JSON_TYPE, Arc::new(Placeholder));
        assert_eq!(conn.state(), ConnectionState::Processing);
        assert_eq!(conn.stats(), ConnectionStats::default());
    }

    #[tokio::test]
    async fn test_write_failure_ends_processing() {
        let (conn, client) = connected(MSGPACK_TYPE, Arc::new(WrongFormat));
        let server = tokio::spawn(conn.run());
        let format = client.format();
        let (mut reader, mut writer) = client.into_split();

        let body = Body::encode(format, &"qrpc req 0").unwrap();
        writer.write(&Header::new("Foo.Sum", 0), &body).await.unwrap();

        // The failed write shut the server's write side: no reply arrives.
        assert!(reader.read_header().await.unwrap_err().is_eof());

        // The peer keeps its write half open; the server must stop anyway.
        let stats = tokio::time::timeout(std::time::Duration::from_secs(2), server)
            .await
            .expect("connection kept reading after a write failure")
            .unwrap();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.responses, 0);

        // Later requests go nowhere; they must not be read or spawned.
        for seq in 1..4u64 {
            let _ = writer.write(&Header::new("Foo.Sum", seq), &body).await;
        }
        drop(writer);
    }

    #[tokio::test]
    async fn test_garbage_header_ends_connection() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (a, mut peer) = tokio::io::duplex(4096);
        let (r, w) = split_stream(a);
        let codec = CodecRegistry::new()
            .build(JSON_TYPE, StreamParts::new(r, w))
            .unwrap();
        let server = tokio::spawn(Connection::new(codec, Arc::new(Placeholder)).run());

        peer.write_all(b"{\"ServiceMethod\":\"Foo.Sum\",\"Seq\":0}\n\"hi\"\nGET / HTTP/1.1\n")
            .await
            .unwrap();

        // The bogus header ends Processing; the earlier request is still answered.
        let stats = server.await.unwrap();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.responses, 1);

        let mut raw = String::new();
        peer.read_to_string(&mut raw).await.unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let header: Header = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(header.seq, 0);
        assert_eq!(lines[1], "\"qrpc resp 0\"");
    }
}
