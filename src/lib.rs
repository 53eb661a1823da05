//! # qrpc
//!
//! RPC transport core over any byte stream.
//!
//! A connection starts with a handshake option (a JSON line carrying a magic
//! number and a codec identifier), after which both sides exchange
//! Header/Body pairs in the selected codec. The server reads requests
//! sequentially, runs each one on its own task and serializes responses
//! through a single write gate. Responses are paired with requests by
//! sequence number only.
//!
//! ## Wire layout
//!
//! ```text
//! Option                      {"MagicNumber":12250030,"MsgType":"application/msgpack"}\n
//! Header(req#0) Body(req#0)   codec framed
//! Header(req#1) Body(req#1)
//! ...
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use qrpc::{Client, HandshakeOption, Server};
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> qrpc::Result<()> {
//!     let server = Server::builder()
//!         .handle("Arith.Mul", |(a, b): (i64, i64)| async move { Ok(a * b) })
//!         .build();
//!
//!     let listener = TcpListener::bind("127.0.0.1:0").await?;
//!     let addr = listener.local_addr()?;
//!     tokio::spawn(async move { server.serve(listener).await });
//!
//!     let mut client = Client::dial(addr, &HandshakeOption::default()).await?;
//!     let product: i64 = client.call("Arith.Mul", &(6, 7)).await?;
//!     assert_eq!(product, 42);
//!     client.close().await
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod codec;
pub mod connection;
pub mod error;
pub mod handler;
pub mod handshake;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod writer;

mod client;

pub use client::Client;
pub use codec::{Codec, CodecRegistry};
pub use connection::{ConnectionState, ConnectionStats};
pub use error::{QrpcError, Result};
pub use handler::{Dispatcher, Placeholder, ServiceRegistry};
pub use handshake::{HandshakeOption, MAGIC_NUMBER};
pub use protocol::{Body, Format, Header};
pub use server::{Server, ServerBuilder, ServerConfig};

/// Boxed future used at trait seams that must stay object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
