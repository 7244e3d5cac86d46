//! JSON payload codec using `serde_json`.
//!
//! Header and body payloads are encoded independently and compactly (no
//! whitespace), so the length prefix is the exact byte count of the JSON text.
//!
//! # Example
//!
//! ```
//! use snowrpc::codec::JsonCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Args {
//!     a: i32,
//!     b: i32,
//! }
//!
//! let encoded = JsonCodec::encode(&Args { a: 1, b: 2 }).unwrap();
//! assert_eq!(encoded, br#"{"a":1,"b":2}"#);
//! let decoded: Args = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, Args { a: 1, b: 2 });
//! ```

use crate::error::Result;

/// JSON codec for header and body payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to compact JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized (e.g. a map with
    /// non-string keys).
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
