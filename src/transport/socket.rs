//! TCP and Unix domain socket connections.
//!
//! # Example
//!
//! ```ignore
//! use snowrpc::transport::{dial, Listener};
//!
//! let listener = Listener::bind("tcp", "127.0.0.1:0").await?;
//! let addr = listener.local_addr()?.to_string();
//! let conn = dial("tcp", &addr).await?;
//! ```

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::error::{Result, SnowError};

/// Network kind named by the `network` argument of [`dial`] and [`Listener::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// `"tcp"`, `"tcp4"` or `"tcp6"`.
    Tcp,
    /// `"unix"`.
    Unix,
}

impl FromStr for Network {
    type Err = SnowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" | "tcp4" | "tcp6" => Ok(Network::Tcp),
            "unix" => Ok(Network::Unix),
            other => Err(unsupported(format!("unknown network {:?}", other))),
        }
    }
}

fn unsupported(message: String) -> SnowError {
    SnowError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, message))
}

/// Address a listener is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addr {
    Tcp(std::net::SocketAddr),
    Unix(PathBuf),
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Tcp(addr) => write!(f, "{}", addr),
            Addr::Unix(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Generate a unique socket path in the system temp directory.
///
/// Format: `{tmp}/snowrpc-{pid}-{n}.sock`
pub fn generate_socket_path() -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("snowrpc-{}-{}.sock", std::process::id(), n))
}

/// Connect to `address` on the named network.
pub async fn dial(network: &str, address: &str) -> Result<Connection> {
    match network.parse::<Network>()? {
        Network::Tcp => {
            let stream = TcpStream::connect(address).await?;
            stream.set_nodelay(true)?;
            Ok(Connection::Tcp(stream))
        }
        #[cfg(unix)]
        Network::Unix => Ok(Connection::Unix(UnixStream::connect(address).await?)),
        #[cfg(not(unix))]
        Network::Unix => Err(unsupported("unix sockets are not available".to_string())),
    }
}

/// A connected stream of either network kind.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl From<TcpStream> for Connection {
    fn from(stream: TcpStream) -> Self {
        Connection::Tcp(stream)
    }
}

#[cfg(unix)]
impl From<UnixStream> for Connection {
    fn from(stream: UnixStream) -> Self {
        Connection::Unix(stream)
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Connection::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

enum Inner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

/// Removes a Unix socket file on drop.
struct SocketCleanup {
    path: PathBuf,
}

impl Drop for SocketCleanup {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A bound listener of either network kind.
///
/// A Unix listener removes its socket file when dropped.
pub struct Listener {
    inner: Inner,
    _cleanup: Option<SocketCleanup>,
}

impl Listener {
    /// Bind to `address` on the named network.
    ///
    /// For Unix sockets a stale socket file at the path is removed first.
    pub async fn bind(network: &str, address: &str) -> Result<Self> {
        match network.parse::<Network>()? {
            Network::Tcp => Ok(Self {
                inner: Inner::Tcp(TcpListener::bind(address).await?),
                _cleanup: None,
            }),
            #[cfg(unix)]
            Network::Unix => {
                let path = PathBuf::from(address);
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                let listener = UnixListener::bind(&path)?;
                Ok(Self {
                    inner: Inner::Unix(listener),
                    _cleanup: Some(SocketCleanup { path }),
                })
            }
            #[cfg(not(unix))]
            Network::Unix => Err(unsupported("unix sockets are not available".to_string())),
        }
    }

    /// Accept a single connection.
    pub async fn accept(&self) -> Result<Connection> {
        match &self.inner {
            Inner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                tracing::debug!(%peer, "Accepted TCP connection");
                Ok(Connection::Tcp(stream))
            }
            #[cfg(unix)]
            Inner::Unix(listener) => {
                let (stream, _peer) = listener.accept().await?;
                tracing::debug!("Accepted Unix connection");
                Ok(Connection::Unix(stream))
            }
        }
    }

    /// Get the bound address.
    pub fn local_addr(&self) -> Result<Addr> {
        match &self.inner {
            Inner::Tcp(listener) => Ok(Addr::Tcp(listener.local_addr()?)),
            #[cfg(unix)]
            Inner::Unix(listener) => {
                let addr = listener.local_addr()?;
                let path = addr.as_pathname().map(PathBuf::from).unwrap_or_default();
                Ok(Addr::Unix(path))
            }
        }
    }

    /// Network kind of this listener.
    pub fn network(&self) -> Network {
        match &self.inner {
            Inner::Tcp(_) => Network::Tcp,
            #[cfg(unix)]
            Inner::Unix(_) => Network::Unix,
        }
    }
}
