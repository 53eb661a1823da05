//! Service registry for dispatching calls by "Service.Method" name.
//!
//! The connection pipeline talks to services through one seam, the
//! [`Dispatcher`] trait: given a header and the still-encoded body it either
//! fails (unknown method, argument does not decode) or hands back an
//! [`Invocation`] that runs the call and encodes the reply.
//!
//! [`ServiceRegistry`] is the standard dispatcher. Each registered method
//! knows its argument type, so decoding happens before the call is spawned.
//!
//! # Example
//!
//! ```
//! use qrpc::handler::ServiceRegistry;
//!
//! let mut registry = ServiceRegistry::new();
//! registry.register("Arith.Add", |(a, b): (i64, i64)| async move { Ok(a + b) });
//! assert!(registry.contains("Arith.Add"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{QrpcError, Result};
use crate::protocol::{Body, Header};
use crate::BoxFuture;

/// A prepared call: runs the method and yields the encoded reply.
pub type Invocation = BoxFuture<'static, Result<Body>>;

/// The seam between the transport and whatever serves the calls.
pub trait Dispatcher: Send + Sync + 'static {
    /// Look up the method named in `header` and decode its argument.
    ///
    /// Errors become error responses; they never end the connection.
    fn prepare(&self, header: &Header, body: Body) -> Result<Invocation>;
}

/// A registered method with its argument type erased.
pub trait Method: Send + Sync + 'static {
    /// Decode the argument and bind it to the handler.
    fn prepare(&self, body: &Body) -> Result<Invocation>;
}

/// Wrapper that decodes the argument before calling the handler.
pub struct TypedMethod<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, R, Fut> TypedMethod<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    /// Create a new typed method.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Method for TypedMethod<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    fn prepare(&self, body: &Body) -> Result<Invocation> {
        let args: T = body.decode()?;
        let format = body.format();
        let fut = (self.handler)(args);
        Ok(Box::pin(async move {
            let reply = fut.await?;
            Body::encode(format, &reply)
        }))
    }
}

/// Registry mapping "Service.Method" names to methods.
#[derive(Default)]
pub struct ServiceRegistry {
    methods: HashMap<String, Box<dyn Method>>,
}

impl ServiceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a method.
    ///
    /// # Arguments
    ///
    /// * `name` - "Service.Method"
    /// * `handler` - async function from the decoded argument to the reply
    pub fn register<F, T, R, Fut>(&mut self, name: &str, handler: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.methods
            .insert(name.to_string(), Box::new(TypedMethod::new(handler)));
    }

    /// Get a method by name.
    pub fn lookup(&self, name: &str) -> Result<&dyn Method> {
        self.methods
            .get(name)
            .map(|m| m.as_ref())
            .ok_or_else(|| QrpcError::MethodNotFound(name.to_string()))
    }

    /// Whether a method is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Dispatcher for ServiceRegistry {
    fn prepare(&self, header: &Header, body: Body) -> Result<Invocation> {
        self.lookup(&header.service_method)?.prepare(&body)
    }
}
