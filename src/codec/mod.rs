//! Codec module - payload serialization and the role-specific wire codecs.
//!
//! - [`JsonCodec`] - serde_json encode/decode for header and body payloads
//! - [`ClientCodec`] - writes requests, reads responses
//! - [`ServerCodec`] - reads requests, writes responses
//!
//! Both role codecs own one connection, read through a single
//! [`FrameReader`](crate::protocol::FrameReader) and write through a locked
//! [`FrameWriter`](crate::writer::FrameWriter).
//!
//! # Example
//!
//! ```ignore
//! use snowrpc::codec::ClientCodec;
//!
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:12345").await?;
//! let mut codec = ClientCodec::new(stream);
//!
//! codec.write_request("calc.Add", &serde_json::json!({"a": 1, "b": 2})).await?;
//! codec.read_response_header().await?;
//! let reply: serde_json::Value = codec.read_response_body().await?;
//! ```

mod client;
mod json;
mod server;

pub use client::{ClientCodec, RequestSender};
pub use json::JsonCodec;
pub use server::{ResponseSender, ServerCodec};

use crate::protocol::{StatusPolicy, DEFAULT_MAX_SEGMENT_SIZE};

/// Settings shared by client and server codecs.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Largest accepted segment payload; longer length prefixes are framing errors.
    pub max_segment_size: usize,
    /// How handler errors reach the response header (server side only).
    pub status_policy: StatusPolicy,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            status_policy: StatusPolicy::default(),
        }
    }
}
