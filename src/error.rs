//! Error types for snowrpc.

use thiserror::Error;

/// Main error type for all snowrpc operations.
///
/// Variants follow the protocol's failure classes: transport and framing
/// errors leave the stream in an unknown position and end the connection,
/// the others only fail the call that hit them.
#[derive(Debug, Error)]
pub enum SnowError {
    /// I/O error on the underlying connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed segment (bad length line, negative or oversize length).
    #[error("Framing error: {0}")]
    Framing(String),

    /// Peer answered with a non-200 return code.
    #[error("code {code}: {message}")]
    Status { code: i64, message: String },

    /// No handler registered under the requested name.
    #[error("rpc: can't find method {0}")]
    MethodNotFound(String),

    /// Two handlers registered under the same name.
    #[error("rpc: method already registered: {0}")]
    DuplicateMethod(String),

    /// A handler returned an application error.
    #[error("{0}")]
    Handler(String),

    /// Connection closed before a segment started.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl SnowError {
    /// Build an application error from any displayable message.
    pub fn handler(message: impl std::fmt::Display) -> Self {
        SnowError::Handler(message.to_string())
    }

    /// Whether the error leaves the connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SnowError::Io(_) | SnowError::Framing(_) | SnowError::ConnectionClosed
        )
    }
}

/// Result type alias using SnowError.
pub type Result<T> = std::result::Result<T, SnowError>;
