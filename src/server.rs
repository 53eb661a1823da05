//! Server builder and accept loop.
//!
//! The [`ServerBuilder`] collects codec variants, services and limits. The
//! resulting [`Server`] is cheap to clone and owns no listener; hand it one
//! with [`Server::serve`] or drive single streams with [`Server::serve_conn`].
//!
//! # Example
//!
//! ```ignore
//! use qrpc::Server;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> qrpc::Result<()> {
//!     let server = Server::builder()
//!         .handle("Arith.Add", |(a, b): (i64, i64)| async move { Ok(a + b) })
//!         .build();
//!
//!     let listener = TcpListener::bind("127.0.0.1:0").await?;
//!     server.serve(listener).await
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::Instrument;

use crate::codec::{CodecRegistry, NewCodecFn, DEFAULT_MAX_MESSAGE_SIZE};
use crate::connection::{Connection, ConnectionState, ConnectionStats};
use crate::error::Result;
use crate::handler::{Dispatcher, ServiceRegistry};
use crate::handshake::{self, DEFAULT_MAX_OPTION_SIZE};
use crate::transport::Listener;

/// Limits applied to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Largest header or body accepted by the built-in codecs.
    pub max_message_size: usize,
    /// Largest handshake option line, newline included.
    pub max_option_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_option_size: DEFAULT_MAX_OPTION_SIZE,
        }
    }
}

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    codecs: CodecRegistry,
    services: ServiceRegistry,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl ServerBuilder {
    /// Create a builder with the built-in codecs and no services.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            codecs: CodecRegistry::new(),
            services: ServiceRegistry::new(),
            dispatcher: None,
        }
    }

    /// Replace all limits at once.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the maximum header or body size.
    ///
    /// Default: 64 MiB
    pub fn max_message_size(mut self, limit: usize) -> Self {
        self.config.max_message_size = limit;
        self
    }

    /// Set the maximum handshake option size.
    ///
    /// Default: 4 KiB
    pub fn max_option_size(mut self, limit: usize) -> Self {
        self.config.max_option_size = limit;
        self
    }

    /// Register an additional codec variant under `codec_type`.
    pub fn codec(mut self, codec_type: &str, constructor: NewCodecFn) -> Self {
        self.codecs.register(codec_type, constructor);
        self
    }

    /// Register a typed method under "Service.Method".
    ///
    /// Ignored when a dispatcher is installed with [`dispatcher`](Self::dispatcher).
    pub fn handle<F, T, R, Fut>(mut self, method: &str, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.services.register(method, handler);
        self
    }

    /// Route every request through `dispatcher` instead of the method registry.
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Build the server.
    pub fn build(self) -> Server {
        let dispatcher: Arc<dyn Dispatcher> = match self.dispatcher {
            Some(dispatcher) => {
                if !self.services.is_empty() {
                    tracing::warn!(
                        methods = self.services.len(),
                        "custom dispatcher installed, registered methods are unused"
                    );
                }
                dispatcher
            }
            None => Arc::new(self.services),
        };

        Server {
            config: self.config,
            codecs: Arc::new(self.codecs),
            dispatcher,
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured RPC server.
#[derive(Clone)]
pub struct Server {
    config: ServerConfig,
    codecs: Arc<CodecRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Limits in effect.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Codec variants a client may select.
    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Accept connections until the listener fails.
    ///
    /// Each connection runs on its own task. An accept error is returned and
    /// stops the loop; connections already accepted keep running.
    pub async fn serve<L: Listener>(&self, mut listener: L) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "listening");
        }

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!("accept error: {}", e);
                    return Err(e.into());
                }
            };

            let server = self.clone();
            let span = tracing::info_span!("conn", %peer);
            tokio::spawn(
                async move {
                    // Failures are logged inside serve_conn.
                    let _ = server.serve_conn(stream).await;
                }
                .instrument(span),
            );
        }
    }

    /// Run the handshake and then the request pipeline on one stream.
    ///
    /// A rejected handshake drops the stream without writing anything back.
    pub async fn serve_conn<S>(&self, stream: S) -> Result<ConnectionStats>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        tracing::debug!(state = ?ConnectionState::Handshaking, "connection state");
        let codec = match handshake::accept(
            stream,
            &self.codecs,
            self.config.max_option_size,
            self.config.max_message_size,
        )
        .await
        {
            Ok(codec) => codec,
            Err(e) => {
                tracing::warn!("options error: {}", e);
                tracing::debug!(from = ?ConnectionState::Handshaking, to = ?ConnectionState::Closed, "connection state");
                return Err(e);
            }
        };
        tracing::debug!(codec = codec.format().codec_type(), "handshake complete");

        let connection = Connection::new(codec, Arc::clone(&self.dispatcher));
        tracing::debug!(from = ?ConnectionState::Handshaking, to = ?connection.state(), "connection state");
        let stats = connection.run().await;
        tracing::debug!(
            requests = stats.requests,
            responses = stats.responses,
            rejected = stats.rejected,
            "connection closed"
        );
        Ok(stats)
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("codecs", &self.codecs)
            .finish_non_exhaustive()
    }
}
