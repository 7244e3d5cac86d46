//! Handler module - method registration and dispatch.
//!
//! Provides:
//! - [`ServiceRegistry`] - maps `service.method` names to handlers
//! - [`Handler`] - object-safe `call(raw) -> raw` interface
//! - [`TypedHandler`] - adapts an async `Fn(T) -> Result<R>` to [`Handler`]

mod registry;

pub use registry::{BoxFuture, Handler, HandlerResult, ServiceRegistry, TypedHandler};
