//! Placeholder dispatcher.
//!
//! Answers every call, whatever the method name, as long as the argument is a
//! string. The reply is `"qrpc resp {seq}"`. Useful for exercising the
//! transport without any services.

use super::{Dispatcher, Invocation};
use crate::error::Result;
use crate::protocol::{Body, Header};

/// Dispatcher that decodes a string argument and echoes the sequence number.
#[derive(Debug, Clone, Copy, Default)]
pub struct Placeholder;

impl Dispatcher for Placeholder {
    fn prepare(&self, header: &Header, body: Body) -> Result<Invocation> {
        let arg: String = body.decode()?;
        tracing::debug!(seq = header.seq, method = %header.service_method, %arg, "placeholder request");

        let reply = format!("qrpc resp {}", header.seq);
        let format = body.format();
        Ok(Box::pin(async move { Body::encode(format, &reply) }))
    }
}
