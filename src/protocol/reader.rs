//! Segment reader over a buffered byte stream.
//!
//! Reads one segment at a time:
//! 1. a length line terminated by CRLF
//! 2. exactly `length` payload bytes
//! 3. the segment trailer (2 bytes after a header, 4 after a body)
//!
//! A reader has exactly one consumer, so no locking happens here.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use super::wire_format::{
    parse_length_line, SegmentKind, DEFAULT_MAX_SEGMENT_SIZE, MAX_LENGTH_LINE_LEN,
};
use crate::codec::JsonCodec;
use crate::error::{Result, SnowError};

/// Upper bound on the buffer reserved before a segment's bytes arrive.
const INITIAL_SEGMENT_CAPACITY: usize = 64 * 1024;

/// Buffered reader that extracts length-prefixed segments.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    /// Scratch buffer for the length line.
    line: Vec<u8>,
    max_segment_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader with the default maximum segment size.
    pub fn new(reader: R) -> Self {
        Self::with_max_segment_size(reader, DEFAULT_MAX_SEGMENT_SIZE)
    }

    /// Create a reader with a custom maximum segment size.
    pub fn with_max_segment_size(reader: R, max_segment_size: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            line: Vec::with_capacity(MAX_LENGTH_LINE_LEN),
            max_segment_size,
        }
    }

    /// Read the length line of the next segment.
    ///
    /// Returns [`SnowError::ConnectionClosed`] if the stream ends before the
    /// first byte of the line.
    pub async fn read_length(&mut self, kind: SegmentKind) -> Result<usize> {
        self.line.clear();
        let mut limited = (&mut self.inner).take(MAX_LENGTH_LINE_LEN as u64);
        let n = limited.read_until(b'\n', &mut self.line).await?;

        if n == 0 {
            return Err(SnowError::ConnectionClosed);
        }
        if !self.line.ends_with(b"\n") {
            if n >= MAX_LENGTH_LINE_LEN {
                return Err(SnowError::Framing(format!("{} length line too long", kind)));
            }
            return Err(SnowError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("connection closed inside {} length line", kind),
            )));
        }

        parse_length_line(&self.line, kind, self.max_segment_size)
    }

    /// Read a full segment and return its payload without the trailer.
    pub async fn read_segment(&mut self, kind: SegmentKind) -> Result<Bytes> {
        let len = self.read_length(kind).await?;
        let total = segment_total(len, kind)?;

        // Memory grows with the bytes received, not with the declared length.
        let mut buf = Vec::with_capacity(total.min(INITIAL_SEGMENT_CAPACITY));
        let mut limited = (&mut self.inner).take(total as u64);
        let n = limited.read_to_end(&mut buf).await?;
        if n != total {
            return Err(truncated(kind));
        }
        buf.truncate(len);

        Ok(Bytes::from(buf))
    }

    /// Read a segment and decode its payload as JSON.
    ///
    /// The segment is consumed before decoding, so a decode error leaves the
    /// stream positioned at the next segment.
    pub async fn read_json<T: DeserializeOwned>(&mut self, kind: SegmentKind) -> Result<T> {
        let payload = self.read_segment(kind).await?;
        JsonCodec::decode(&payload)
    }

    /// Consume a segment without parsing it. Returns the payload length.
    pub async fn skip_segment(&mut self, kind: SegmentKind) -> Result<usize> {
        let len = self.read_length(kind).await?;
        let total = segment_total(len, kind)? as u64;

        let mut limited = (&mut self.inner).take(total);
        let copied = tokio::io::copy(&mut limited, &mut tokio::io::sink()).await?;
        if copied != total {
            return Err(truncated(kind));
        }

        Ok(len)
    }

    /// Get the configured maximum segment size.
    pub fn max_segment_size(&self) -> usize {
        self.max_segment_size
    }

    /// Unwrap the underlying reader, dropping any buffered bytes.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

/// Payload plus trailer length, rejecting lengths that overflow.
fn segment_total(len: usize, kind: SegmentKind) -> Result<usize> {
    len.checked_add(kind.trailer_len())
        .filter(|total| u64::try_from(*total).is_ok())
        .ok_or_else(|| SnowError::Framing(format!("{} length {} out of range", kind, len)))
}

fn truncated(kind: SegmentKind) -> SnowError {
    SnowError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("connection closed inside {}", kind),
    ))
}
