//! RPC client: concurrent calls over one connection.
//!
//! Responses carry no request id, so they are matched to calls by order.
//! A call registers its pending slot and writes its request under one lock,
//! which keeps the pending queue in wire order. A single reader task pops
//! the oldest slot for every response:
//!
//! ```text
//! call A ─┐                                       ┌─► slot A
//! call B ─┼─► send_lock ─► socket ─► reader task ─┼─► slot B
//! call C ─┘                                       └─► slot C
//! ```
//!
//! # Example
//!
//! ```ignore
//! use snowrpc::Client;
//!
//! let client = Client::dial("tcp", "127.0.0.1:12345").await?;
//! let reply: Reply = client.call("calc.Add", &Args { a: 1, b: 2 }).await?;
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::codec::{ClientCodec, CodecConfig, JsonCodec, RequestSender};
use crate::error::{Result, SnowError};
use crate::protocol::Frame;
use crate::transport;

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;
type ReplySender = oneshot::Sender<Result<Bytes>>;

#[derive(Default)]
struct PendingCalls {
    queue: VecDeque<ReplySender>,
    closed: bool,
}

struct Inner {
    sender: RequestSender<BoxWriter>,
    send_lock: tokio::sync::Mutex<()>,
    pending: Mutex<PendingCalls>,
}

impl Inner {
    fn pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, slot: ReplySender) -> Result<()> {
        let mut pending = self.pending();
        if pending.closed {
            return Err(SnowError::ConnectionClosed);
        }
        pending.queue.push_back(slot);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.pending().closed
    }

    fn pop(&self) -> Option<ReplySender> {
        self.pending().queue.pop_front()
    }

    /// Mark the connection dead and fail every outstanding call.
    fn fail_all(&self) {
        let drained: Vec<ReplySender> = {
            let mut pending = self.pending();
            pending.closed = true;
            pending.queue.drain(..).collect()
        };
        for slot in drained {
            let _ = slot.send(Err(SnowError::ConnectionClosed));
        }
    }

    /// Register a slot and write the request while holding the send lock.
    async fn send(&self, frame: Frame, slot: ReplySender) -> Result<()> {
        let _guard = self.send_lock.lock().await;
        self.push(slot)?;
        if let Err(e) = self.sender.write_frame(&frame).await {
            tracing::warn!("Failed to write request: {}", e);
            self.fail_all();
            return Err(e);
        }
        Ok(())
    }
}

/// A connected RPC client. Calls may be issued concurrently through `&self`.
pub struct Client {
    inner: Arc<Inner>,
    reader_task: JoinHandle<()>,
}

impl Client {
    /// Connect to a server on the named network (`"tcp"` or `"unix"`).
    pub async fn dial(network: &str, address: &str) -> Result<Self> {
        let conn = transport::dial(network, address).await?;
        tracing::debug!(network, address, "Connected");
        Ok(Self::new(conn))
    }

    /// Run a client over an already connected stream.
    ///
    /// Must be called inside a tokio runtime; the response reader is spawned.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_config(stream, CodecConfig::default())
    }

    /// Run a client with custom codec settings.
    pub fn with_config<S>(stream: S, config: CodecConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let codec: ClientCodec<BoxReader, BoxWriter> =
            ClientCodec::from_parts(Box::new(reader), Box::new(writer), config);

        let inner = Arc::new(Inner {
            sender: codec.sender(),
            send_lock: tokio::sync::Mutex::new(()),
            pending: Mutex::new(PendingCalls::default()),
        });
        let reader_task = tokio::spawn(read_loop(codec, inner.clone()));

        Self { inner, reader_task }
    }

    /// Call `method` with `args` and wait for its result.
    ///
    /// A non-200 response fails only this call with [`SnowError::Status`].
    /// If the connection breaks, every outstanding call and every later
    /// call fails with [`SnowError::ConnectionClosed`].
    pub async fn call<A, R>(&self, method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = self.call_raw(Frame::request(method, args)?).await?;
        JsonCodec::decode(&body)
    }

    /// Send a prebuilt request frame and wait for the raw JSON result.
    pub async fn call_raw(&self, frame: Frame) -> Result<Bytes> {
        let (tx, rx) = oneshot::channel();

        // A cancelled caller must not leave a pending slot without its
        // request on the wire, so the send runs to completion in its own task.
        let inner = self.inner.clone();
        match tokio::spawn(async move { inner.send(frame, tx).await }).await {
            Ok(sent) => sent?,
            Err(_) => return Err(SnowError::ConnectionClosed),
        }

        rx.await.map_err(|_| SnowError::ConnectionClosed)?
    }

    /// Whether the connection has failed or been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Close the connection.
    ///
    /// Outstanding calls fail with [`SnowError::ConnectionClosed`].
    pub async fn close(&self) -> Result<()> {
        let _guard = self.inner.send_lock.lock().await;
        self.inner.fail_all();
        self.reader_task.abort();
        self.inner.sender.shutdown().await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Read responses and hand each to the oldest pending call.
async fn read_loop(mut codec: ClientCodec<BoxReader, BoxWriter>, inner: Arc<Inner>) {
    let err = loop {
        let reply = match codec.read_response_header().await {
            Ok(()) => match codec.read_response_body_raw().await {
                Ok(body) => Ok(body),
                Err(e) => break e,
            },
            Err(SnowError::Status { code, message }) => {
                if let Err(e) = codec.skip_response_body().await {
                    break e;
                }
                Err(SnowError::Status { code, message })
            }
            Err(e) => break e,
        };

        match inner.pop() {
            Some(slot) => {
                let _ = slot.send(reply);
            }
            None if inner.is_closed() => break SnowError::ConnectionClosed,
            None => {
                break SnowError::Framing("response without a pending call".to_string());
            }
        }
    };

    match &err {
        SnowError::ConnectionClosed => tracing::debug!("Server closed connection"),
        _ if inner.is_closed() => tracing::debug!("Read loop stopped after close: {}", err),
        e => tracing::warn!("Read loop error: {}", e),
    }
    inner.fail_all();
}
