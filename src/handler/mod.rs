//! Handler module - the service dispatch seam.
//!
//! Provides:
//! - [`Dispatcher`] - what the connection pipeline calls for every request
//! - [`ServiceRegistry`] - maps "Service.Method" names to typed handlers
//! - [`Placeholder`] - answers any string argument with `"qrpc resp {seq}"`
//!
//! # Example
//!
//! ```
//! use qrpc::handler::ServiceRegistry;
//! use qrpc::QrpcError;
//!
//! let mut registry = ServiceRegistry::new();
//!
//! registry.register("Arith.Div", |(a, b): (i64, i64)| async move {
//!     if b == 0 {
//!         return Err(QrpcError::Service("divide by zero".into()));
//!     }
//!     Ok(a / b)
//! });
//! ```

mod placeholder;
mod registry;

pub use placeholder::Placeholder;
pub use registry::{Dispatcher, Invocation, Method, ServiceRegistry, TypedMethod};
