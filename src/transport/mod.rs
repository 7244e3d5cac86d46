//! Transport module - stream sockets the codecs run over.
//!
//! Provides:
//! - TCP (`"tcp"`, `"tcp4"`, `"tcp6"`)
//! - Unix Domain Sockets (`"unix"`, Unix platforms only)

mod socket;

pub use socket::{dial, generate_socket_path, Addr, Connection, Listener, Network};
