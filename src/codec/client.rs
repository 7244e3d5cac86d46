//! Client-side codec: writes request frames, reads response frames.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

use super::CodecConfig;
use crate::error::Result;
use crate::protocol::{Frame, FrameReader, ResponseHeader, SegmentKind};
use crate::writer::FrameWriter;

/// Codec for the calling side of a connection.
///
/// Reads are single-consumer and need `&mut self`. Writes go through a
/// per-connection lock and take `&self`; use [`ClientCodec::sender`] to write
/// requests from other tasks while this codec keeps reading responses.
pub struct ClientCodec<R, W> {
    reader: FrameReader<R>,
    writer: Arc<FrameWriter<W>>,
}

impl<S: AsyncRead + AsyncWrite> ClientCodec<ReadHalf<S>, WriteHalf<S>> {
    /// Create a codec that owns the given connection.
    pub fn new(stream: S) -> Self {
        Self::with_config(stream, CodecConfig::default())
    }

    /// Create a codec with custom settings.
    pub fn with_config(stream: S, config: CodecConfig) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer, config)
    }
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> ClientCodec<R, W> {
    /// Create a codec from separate read and write halves.
    pub fn from_parts(reader: R, writer: W, config: CodecConfig) -> Self {
        Self {
            reader: FrameReader::with_max_segment_size(reader, config.max_segment_size),
            writer: Arc::new(FrameWriter::new(writer)),
        }
    }

    /// Get a cloneable handle for writing requests on this connection.
    pub fn sender(&self) -> RequestSender<W> {
        RequestSender {
            writer: self.writer.clone(),
        }
    }

    /// Write one request frame and flush it.
    ///
    /// Serialization errors are returned before any byte is written.
    pub async fn write_request<T: Serialize + ?Sized>(&self, method: &str, args: &T) -> Result<()> {
        let frame = Frame::request(method, args)?;
        self.writer.write_frame(&frame).await
    }

    /// Read the next response header.
    ///
    /// A return code other than 200 yields [`SnowError::Status`]; the body
    /// segment of that response is still unread.
    ///
    /// [`SnowError::Status`]: crate::error::SnowError::Status
    pub async fn read_response_header(&mut self) -> Result<()> {
        let header: ResponseHeader = self.reader.read_json(SegmentKind::ResponseHeader).await?;
        header.into_result()
    }

    /// Read the response body and decode it as `T`.
    pub async fn read_response_body<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.reader.read_json(SegmentKind::ResponseBody).await
    }

    /// Read the response body as raw JSON bytes.
    pub async fn read_response_body_raw(&mut self) -> Result<Bytes> {
        self.reader.read_segment(SegmentKind::ResponseBody).await
    }

    /// Consume the response body without decoding it.
    pub async fn skip_response_body(&mut self) -> Result<()> {
        self.reader.skip_segment(SegmentKind::ResponseBody).await?;
        Ok(())
    }

    /// Close the connection.
    ///
    /// Shuts the write half down and drops the read half. Writes are flushed
    /// as they happen, so nothing queued is lost.
    pub async fn close(self) -> Result<()> {
        self.writer.shutdown().await
    }
}

/// Cloneable request writer sharing a [`ClientCodec`]'s connection lock.
pub struct RequestSender<W> {
    writer: Arc<FrameWriter<W>>,
}

impl<W> Clone for RequestSender<W> {
    fn clone(&self) -> Self {
        Self {
            writer: self.writer.clone(),
        }
    }
}

impl<W: AsyncWrite + Unpin> RequestSender<W> {
    /// Write one request frame and flush it.
    pub async fn write_request<T: Serialize + ?Sized>(&self, method: &str, args: &T) -> Result<()> {
        let frame = Frame::request(method, args)?;
        self.writer.write_frame(&frame).await
    }

    /// Write a request frame built with [`Frame::request`].
    pub async fn write_frame(&self, frame: &Frame) -> Result<()> {
        self.writer.write_frame(frame).await
    }

    /// Shut the write half of the connection down.
    pub async fn shutdown(&self) -> Result<()> {
        self.writer.shutdown().await
    }
}
