//! Arith demo - typed methods over the JSON codec.
//!
//! Registers `Arith.Add`, `Arith.Mul` and `Arith.Div` on a server, then
//! calls them from a client that selects `application/json`. The division
//! by zero comes back as a remote error and the connection keeps working.
//!
//! ```text
//! RUST_LOG=qrpc=debug cargo run --example arith
//! ```

use qrpc::{Client, HandshakeOption, QrpcError, Server};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Arguments for every arith method.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
struct Args {
    a: i64,
    b: i64,
}

#[derive(Serialize, Deserialize, Debug)]
struct Quotient {
    quo: i64,
    rem: i64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = Server::builder()
        .handle("Arith.Add", |args: Args| async move { Ok(args.a + args.b) })
        .handle("Arith.Mul", |args: Args| async move { Ok(args.a * args.b) })
        .handle("Arith.Div", |args: Args| async move {
            if args.b == 0 {
                return Err(QrpcError::Service("divide by zero".into()));
            }
            Ok(Quotient {
                quo: args.a / args.b,
                rem: args.a % args.b,
            })
        })
        .build();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { server.serve(listener).await });

    let mut client = Client::dial(addr, &HandshakeOption::json()).await?;

    let args = Args { a: 17, b: 5 };
    let sum: i64 = client.call("Arith.Add", &args).await?;
    let product: i64 = client.call("Arith.Mul", &args).await?;
    let quotient: Quotient = client.call("Arith.Div", &args).await?;
    tracing::info!(sum, product, ?quotient, "17 and 5");

    match client.call::<_, Quotient>("Arith.Div", &Args { a: 1, b: 0 }).await {
        Err(QrpcError::Remote(msg)) => tracing::info!(%msg, "remote error"),
        other => tracing::warn!(?other, "expected a remote error"),
    }

    match client.call::<_, i64>("Arith.Pow", &args).await {
        Err(e) => tracing::info!("{}", e),
        Ok(v) => tracing::warn!(v, "unexpected reply"),
    }

    client.close().await?;
    Ok(())
}
