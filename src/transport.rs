//! Transport module - listeners the server can accept from.
//!
//! - TCP on every platform
//! - Unix Domain Sockets on unix
//!
//! # Example
//!
//! ```ignore
//! use qrpc::transport::bind_unix;
//!
//! let listener = bind_unix("/tmp/qrpc.sock")?;
//! server.serve(listener).await?;
//! ```

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

use crate::BoxFuture;

/// Something that yields connected byte streams.
pub trait Listener: Send + 'static {
    /// Connected stream type.
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    /// Accept one connection, returning it with a printable peer address.
    fn accept(&mut self) -> BoxFuture<'_, std::io::Result<(Self::Stream, String)>>;

    /// Printable local address.
    fn local_addr(&self) -> std::io::Result<String>;
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> BoxFuture<'_, std::io::Result<(TcpStream, String)>> {
        Box::pin(async move {
            let (stream, addr) = TcpListener::accept(self).await?;
            stream.set_nodelay(true)?;
            Ok((stream, addr.to_string()))
        })
    }

    fn local_addr(&self) -> std::io::Result<String> {
        TcpListener::local_addr(self).map(|a| a.to_string())
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::path::Path;

    use tokio::net::{UnixListener, UnixStream};

    use super::Listener;
    use crate::BoxFuture;

    /// Bind a Unix socket, removing a stale socket file at the path first.
    pub fn bind_unix(path: impl AsRef<Path>) -> std::io::Result<UnixListener> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        UnixListener::bind(path)
    }

    impl Listener for UnixListener {
        type Stream = UnixStream;

        fn accept(&mut self) -> BoxFuture<'_, std::io::Result<(UnixStream, String)>> {
            Box::pin(async move {
                let (stream, addr) = UnixListener::accept(self).await?;
                let peer = addr
                    .as_pathname()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "unix:unnamed".to_string());
                Ok((stream, peer))
            })
        }

        fn local_addr(&self) -> std::io::Result<String> {
            let addr = UnixListener::local_addr(self)?;
            Ok(addr
                .as_pathname()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "unix:unnamed".to_string()))
        }
    }
}

#[cfg(unix)]
pub use unix_impl::bind_unix;
