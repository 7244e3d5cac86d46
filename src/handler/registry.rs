//! Service registry for dispatching requests by method name.
//!
//! The registry maps fully qualified `service.method` names to handlers.
//! A handler takes the raw JSON request body and produces the raw JSON
//! result, so the serve loop never needs to know argument types.
//!
//! # Example
//!
//! ```
//! use snowrpc::handler::ServiceRegistry;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Args { a: i64, b: i64 }
//!
//! #[derive(Serialize)]
//! struct Reply { c: i64 }
//!
//! let mut registry = ServiceRegistry::new();
//! registry
//!     .register("calc", "Add", |args: Args| async move { Ok(Reply { c: args.a + args.b }) })
//!     .unwrap();
//!
//! assert!(registry.contains("calc.Add"));
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::JsonCodec;
use crate::error::{Result, SnowError};

/// Result type for handler invocations: the JSON-encoded return value.
pub type HandlerResult = Result<Bytes>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for handler functions.
pub trait Handler: Send + Sync + 'static {
    /// Handle a request with the raw JSON body.
    fn call(&self, data: Bytes) -> BoxFuture<'static, HandlerResult>;
}

/// Wrapper that decodes the body into `T` and encodes the returned `R`.
pub struct TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    fn call(&self, data: Bytes) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match JsonCodec::decode(&data) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let fut = (self.handler)(parsed);
        Box::pin(async move {
            let reply = fut.await?;
            Ok(Bytes::from(JsonCodec::encode(&reply)?))
        })
    }
}

/// Registry mapping `service.method` names to handlers.
pub struct ServiceRegistry {
    methods: HashMap<String, Box<dyn Handler>>,
}

impl ServiceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Register a typed handler as `service.method`.
    ///
    /// # Errors
    ///
    /// Returns [`SnowError::DuplicateMethod`] if the name is already taken.
    pub fn register<F, T, R, Fut>(&mut self, service: &str, method: &str, handler: F) -> Result<()>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let name = format!("{}.{}", service, method);
        self.register_handler(name, Box::new(TypedHandler::new(handler)))
    }

    /// Register an already boxed handler under a full method name.
    pub fn register_handler(&mut self, name: String, handler: Box<dyn Handler>) -> Result<()> {
        if self.methods.contains_key(&name) {
            return Err(SnowError::DuplicateMethod(name));
        }
        self.methods.insert(name, handler);
        Ok(())
    }

    /// Get a handler by full method name.
    pub fn get_handler(&self, name: &str) -> Option<&dyn Handler> {
        self.methods.get(name).map(|h| h.as_ref())
    }

    /// Check if a method is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Check if no methods are registered.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Look a method up and start its invocation.
    ///
    /// The returned future does not borrow the registry and can be spawned.
    pub fn invoke(&self, name: &str, payload: Bytes) -> Result<BoxFuture<'static, HandlerResult>> {
        let handler = self
            .get_handler(name)
            .ok_or_else(|| SnowError::MethodNotFound(name.to_string()))?;
        Ok(handler.call(payload))
    }

    /// Dispatch a request to the named handler and wait for its result.
    pub async fn dispatch(&self, name: &str, payload: Bytes) -> HandlerResult {
        self.invoke(name, payload)?.await
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Args {
        a: i64,
        b: i64,
    }

    #[derive(Serialize)]
    struct Reply {
        c: i64,
    }

    fn calc_registry() -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        registry
            .register("calc", "Add", |args: Args| async move {
                Ok(Reply { c: args.a + args.b })
            })
            .unwrap();
        registry
            .register("calc", "Div", |args: Args| async move {
                if args.b == 0 {
                    return Err(SnowError::handler("division by zero"));
                }
                Ok(Reply { c: args.a / args.b })
            })
            .unwrap();
        registry
    }

    #[test]
    fn test_register_method() {
        let registry = calc_registry();
        assert!(registry.get_handler("calc.Add").is_some());
        assert!(registry.contains("calc.Div"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.method_names(), vec!["calc.Add", "calc.Div"]);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = calc_registry();
        let result = registry.register("calc", "Add", |_: ()| async { Ok(()) });
        assert!(matches!(result, Err(SnowError::DuplicateMethod(name)) if name == "calc.Add"));
    }

    #[test]
    fn test_handler_not_found() {
        let registry = ServiceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get_handler("nonexistent").is_none());
        assert!(matches!(
            registry.invoke("calc.Mul", Bytes::new()),
            Err(SnowError::MethodNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_encodes_result() {
        let registry = calc_registry();
        let reply = registry
            .dispatch("calc.Add", Bytes::from_static(br#"{"a":1,"b":2}"#))
            .await
            .unwrap();
        assert_eq!(&reply[..], br#"{"c":3}"#);
    }

    #[tokio::test]
    async fn test_dispatch_handler_error() {
        let registry = calc_registry();
        let err = registry
            .dispatch("calc.Div", Bytes::from_static(br#"{"a":1,"b":0}"#))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "division by zero");
    }

    #[tokio::test]
    async fn test_dispatch_bad_arguments() {
        let registry = calc_registry();
        let err = registry
            .dispatch("calc.Add", Bytes::from_static(br#"{"a":"one"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, SnowError::Json(_)));
    }

    #[tokio::test]
    async fn test_invoke_future_outlives_borrow() {
        let registry = calc_registry();
        let fut = registry
            .invoke("calc.Add", Bytes::from_static(br#"{"a":20,"b":22}"#))
            .unwrap();
        drop(registry);

        let reply = tokio::spawn(fut).await.unwrap().unwrap();
        assert_eq!(&reply[..], br#"{"c":42}"#);
    }
}
