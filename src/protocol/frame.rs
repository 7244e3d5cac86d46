//! Frame struct and frame building.
//!
//! A [`Frame`] holds the already-serialized header and body payloads. It is
//! built right before a write and dropped right after; nothing is reused.
//!
//! # Example
//!
//! ```
//! use snowrpc::protocol::{Frame, RequestHeader};
//!
//! let frame = Frame::from_values(&RequestHeader::new("calc.Add"), &[1, 2]).unwrap();
//! assert_eq!(
//!     &frame.encode()[..],
//!     b"29\r\n{\"interface_name\":\"calc.Add\"}\r\n5\r\n[1,2]\r\n\r\n"
//! );
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::wire_format::{
    RequestHeader, ResponseHeader, BODY_TRAILER_LEN, CRLF, HEADER_TRAILER_LEN,
};
use crate::codec::JsonCodec;
use crate::error::Result;

/// A complete protocol frame: header JSON and body JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Serialized header object.
    pub header: Bytes,
    /// Serialized body value.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from serialized header and body.
    pub fn new(header: Bytes, body: Bytes) -> Self {
        Self { header, body }
    }

    /// Serialize header and body independently into a frame.
    ///
    /// # Errors
    ///
    /// Returns an error if either value cannot be serialized to JSON.
    pub fn from_values<H: Serialize + ?Sized, B: Serialize + ?Sized>(
        header: &H,
        body: &B,
    ) -> Result<Self> {
        let header = JsonCodec::encode(header)?;
        let body = JsonCodec::encode(body)?;
        Ok(Self::new(Bytes::from(header), Bytes::from(body)))
    }

    /// Build a request frame for `method` carrying `args`.
    pub fn request<T: Serialize + ?Sized>(method: &str, args: &T) -> Result<Self> {
        Self::from_values(&RequestHeader::new(method), args)
    }

    /// Build a response frame from a header and a result value.
    pub fn response<T: Serialize + ?Sized>(header: &ResponseHeader, result: &T) -> Result<Self> {
        Self::from_values(header, result)
    }

    /// Total number of bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        length_line_len(self.header.len())
            + self.header.len()
            + HEADER_TRAILER_LEN
            + length_line_len(self.body.len())
            + self.body.len()
            + BODY_TRAILER_LEN
    }

    /// Encode the frame into one contiguous buffer.
    pub fn encode(&self) -> Bytes {
        build_frame(&self.header, &self.body)
    }
}

/// Build `<len(h)>\r\n<h>\r\n<len(b)>\r\n<b>\r\n\r\n`.
pub fn build_frame(header: &[u8], body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        length_line_len(header.len())
            + header.len()
            + HEADER_TRAILER_LEN
            + length_line_len(body.len())
            + body.len()
            + BODY_TRAILER_LEN,
    );
    put_segment(&mut buf, header);
    put_segment(&mut buf, body);
    buf.put_slice(CRLF);
    buf.freeze()
}

fn put_segment(buf: &mut BytesMut, payload: &[u8]) {
    buf.put_slice(payload.len().to_string().as_bytes());
    buf.put_slice(CRLF);
    buf.put_slice(payload);
    buf.put_slice(CRLF);
}

fn length_line_len(len: usize) -> usize {
    len.to_string().len() + CRLF.len()
}
