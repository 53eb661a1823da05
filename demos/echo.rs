//! Echo demo - placeholder server and a five-call client.
//!
//! This example demonstrates:
//! - Starting a server on an ephemeral TCP port
//! - Handshaking with the default option (MessagePack)
//! - Sending requests with `Seq` 0..4 and reading each reply
//!
//! ```text
//! RUST_LOG=debug cargo run --example echo
//! ```

use std::sync::Arc;

use qrpc::{Client, HandshakeOption, Placeholder, Server};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "start rpc server");

    let server = Server::builder().dispatcher(Arc::new(Placeholder)).build();
    tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            tracing::error!("server stopped: {}", e);
        }
    });

    let mut client = Client::dial(addr, &HandshakeOption::default()).await?;
    for i in 0..5 {
        let seq = client.next_seq();
        let reply: String = client.call("Foo.Sum", &format!("qrpc req {seq}")).await?;
        tracing::info!(i, %reply, "reply");
    }

    client.close().await?;
    Ok(())
}
