//! # snowrpc
//!
//! Length-prefixed JSON RPC over stream sockets.
//!
//! Every message is one frame of two length-prefixed JSON segments:
//!
//! ```text
//! <header-length>\r\n<header-json>\r\n<body-length>\r\n<body-json>\r\n\r\n
//! ```
//!
//! Requests carry `{"interface_name": "<service.method>"}` in the header and
//! the arguments in the body. Responses carry
//! `{"return_code": <int>, "message": "<text>"}` and the result. Frames
//! have no request id; a connection answers requests strictly in order.
//!
//! ## Layers
//!
//! - [`protocol`] - segment framing, header types, frame reader
//! - [`codec`] - [`ClientCodec`](codec::ClientCodec) and
//!   [`ServerCodec`](codec::ServerCodec), one per connection role
//! - [`Server`] / [`Client`] - dispatch engine on top of the codecs
//! - [`transport`] - TCP and Unix socket dial/listen
//!
//! ## Example
//!
//! ```ignore
//! use snowrpc::{Client, Server};
//!
//! #[tokio::main]
//! async fn main() -> snowrpc::Result<()> {
//!     let server = Server::builder()
//!         .register("calc", "Add", |args: Args| async move {
//!             Ok(Reply { c: args.a + args.b })
//!         })
//!         .build()?;
//!     tokio::spawn(async move { server.listen_and_serve("tcp", "127.0.0.1:12345").await });
//!
//!     let client = Client::dial("tcp", "127.0.0.1:12345").await?;
//!     let reply: Reply = client.call("calc.Add", &Args { a: 1, b: 2 }).await?;
//!     assert_eq!(reply.c, 3);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;

mod client;
mod server;
mod writer;

pub use client::Client;
pub use error::{Result, SnowError};
pub use protocol::StatusPolicy;
pub use server::{Server, ServerBuilder, DEFAULT_MAX_CONCURRENT_HANDLERS};
