//! Server builder and per-connection serve loop.
//!
//! The [`ServerBuilder`] collects handlers into a [`ServiceRegistry`]. The
//! [`Server`] then runs each accepted connection:
//! 1. Read the request header (method name)
//! 2. Read the raw body, or skip it when the method is unknown
//! 3. Spawn the handler (bounded by a semaphore)
//! 4. Queue the pending reply for the connection's responder task
//!
//! The wire carries no sequence number, so the responder writes replies in
//! the order their requests arrived even when handlers finish out of order.
//!
//! # Example
//!
//! ```ignore
//! use snowrpc::Server;
//!
//! let server = Server::builder()
//!     .register("calc", "Add", |args: Args| async move { Ok(Reply { c: args.a + args.b }) })
//!     .build()?;
//!
//! server.listen_and_serve("tcp", "127.0.0.1:12345").await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::codec::{CodecConfig, ResponseSender, ServerCodec};
use crate::error::{Result, SnowError};
use crate::handler::{HandlerResult, ServiceRegistry};
use crate::protocol::{ResponseStatus, StatusPolicy};
use crate::transport::Listener;

/// Default maximum concurrent handlers per connection.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder {
    registry: ServiceRegistry,
    error: Option<SnowError>,
    max_concurrent_handlers: usize,
    codec_config: CodecConfig,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            registry: ServiceRegistry::new(),
            error: None,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            codec_config: CodecConfig::default(),
        }
    }

    /// Register an async handler as `service.method`.
    ///
    /// The handler receives the decoded request body and its `Ok` value is
    /// sent back as the response body. A duplicate name makes [`build`] fail.
    ///
    /// [`build`]: ServerBuilder::build
    pub fn register<F, T, R, Fut>(mut self, service: &str, method: &str, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        if let Err(e) = self.registry.register(service, method, handler) {
            self.error.get_or_insert(e);
        }
        self
    }

    /// Set the maximum number of handlers running at once on one connection.
    ///
    /// When the limit is reached the connection stops reading requests until
    /// a handler finishes.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.max_concurrent_handlers = limit.max(1);
        self
    }

    /// Set the codec settings used for every connection.
    pub fn codec_config(mut self, config: CodecConfig) -> Self {
        self.codec_config = config;
        self
    }

    /// Set how handler errors reach the response header.
    ///
    /// Default: [`StatusPolicy::Report`]
    pub fn status_policy(mut self, policy: StatusPolicy) -> Self {
        self.codec_config.status_policy = policy;
        self
    }

    /// Build the server.
    ///
    /// # Errors
    ///
    /// Returns the first registration error, such as
    /// [`SnowError::DuplicateMethod`].
    pub fn build(self) -> Result<Server> {
        if let Some(e) = self.error {
            return Err(e);
        }
        Ok(Server {
            registry: Arc::new(self.registry),
            max_concurrent_handlers: self.max_concurrent_handlers,
            codec_config: self.codec_config,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reply slot queued for the responder, in request order.
enum Pending {
    Ready(HandlerResult),
    Running(JoinHandle<HandlerResult>),
}

/// An RPC server. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Server {
    registry: Arc<ServiceRegistry>,
    max_concurrent_handlers: usize,
    codec_config: CodecConfig,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Registered handlers.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Bind a listener and serve every connection it accepts.
    pub async fn listen_and_serve(&self, network: &str, address: &str) -> Result<()> {
        let listener = Listener::bind(network, address).await?;
        self.serve(listener).await
    }

    /// Serve every connection accepted on `listener`, one task each.
    ///
    /// Runs until accepting fails. Errors on a single connection are logged
    /// and never stop the server.
    pub async fn serve(&self, listener: Listener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "Serving");
        }

        loop {
            let conn = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                    return Err(e);
                }
            };

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.serve_conn(conn).await {
                    tracing::warn!("Connection error: {}", e);
                }
            });
        }
    }

    /// Serve a single connection until the peer closes it.
    ///
    /// Returns `Ok(())` on a clean close between frames. A framing or
    /// transport error ends the connection and is returned after the
    /// replies already queued have been written.
    pub async fn serve_conn<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let mut codec = ServerCodec::with_config(stream, self.codec_config.clone());

        let (tx, rx) = mpsc::channel(self.max_concurrent_handlers);
        let responder = tokio::spawn(respond_in_order(rx, codec.responder()));

        let read_result = self.read_loop(&mut codec, tx).await;

        let write_result = match responder.await {
            Ok(result) => result,
            Err(e) => Err(SnowError::handler(format!("responder task failed: {}", e))),
        };
        if let Err(e) = codec.close().await {
            tracing::debug!("Shutdown error: {}", e);
        }

        read_result.and(write_result)
    }

    async fn read_loop<S>(
        &self,
        codec: &mut ServerCodec<ReadHalf<S>, WriteHalf<S>>,
        tx: mpsc::Sender<Pending>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_handlers));

        loop {
            let method = match codec.read_request_header().await {
                Ok(method) => method,
                Err(SnowError::ConnectionClosed) => {
                    tracing::debug!("Peer closed connection");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let pending = if self.registry.contains(&method) {
                let body = codec.read_request_body_raw().await?;
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| SnowError::ConnectionClosed)?;

                match self.registry.invoke(&method, body) {
                    Ok(fut) => Pending::Running(tokio::spawn(async move {
                        // Permit is held until the handler completes
                        let _permit = permit;
                        fut.await
                    })),
                    Err(e) => Pending::Ready(Err(e)),
                }
            } else {
                codec.skip_request_body().await?;
                tracing::warn!(method = %method, "Unknown method");
                Pending::Ready(Err(SnowError::MethodNotFound(method)))
            };

            if tx.send(pending).await.is_err() {
                // Responder stopped after a write error; it reports the cause.
                return Ok(());
            }
        }
    }
}

/// Write replies in queue order until the read loop hangs up.
async fn respond_in_order<W>(
    mut rx: mpsc::Receiver<Pending>,
    responder: ResponseSender<W>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(pending) = rx.recv().await {
        let result = match pending {
            Pending::Ready(result) => result,
            Pending::Running(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(SnowError::handler(format!("handler task failed: {}", e))),
            },
        };

        let written = match result {
            Ok(body) => responder.write_response_raw(&ResponseStatus::ok(), body).await,
            Err(e) => {
                tracing::debug!("Handler error: {}", e);
                responder
                    .write_response(&ResponseStatus::error(e.to_string()), &())
                    .await
            }
        };

        if let Err(e) = written {
            tracing::warn!("Failed to write response: {}", e);
            return Err(e);
        }
    }
    Ok(())
}
