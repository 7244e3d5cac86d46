//! Locked frame writer shared by every task writing to one connection.
//!
//! Concurrent calls share one stream, so a whole frame (header and body
//! segments) is written and flushed while holding the connection's lock:
//!
//! ```text
//! Call 1 ─┐
//! Call 2 ─┼─► Mutex<BufWriter<W>> ─► write_all(frame) + flush ─► Socket
//! Call N ─┘
//! ```

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::protocol::Frame;

/// Buffered writer guarded by a per-connection lock.
pub struct FrameWriter<W> {
    inner: Mutex<BufWriter<W>>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a write half in a buffered, locked writer.
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(BufWriter::new(writer)),
        }
    }

    /// Write one frame and flush it.
    ///
    /// The frame is contiguous on the wire: no other writer can interleave
    /// bytes between its header and body segments.
    pub async fn write_frame(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode();

        let mut writer = self.inner.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;

        tracing::trace!(frame_size_bytes = bytes.len(), "Frame written");
        Ok(())
    }

    /// Shut the write half down. Bytes still buffered are not written.
    pub async fn shutdown(&self) -> Result<()> {
        let mut writer = self.inner.lock().await;
        writer.get_mut().shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestHeader, ResponseHeader};
    use std::sync::Arc;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_write_frame_flushes_exact_bytes() {
        let (client, mut server) = duplex(4096);
        let writer = FrameWriter::new(client);

        let frame = Frame::from_values(&ResponseHeader::ok(), &serde_json::json!({"c": 3})).unwrap();
        writer.write_frame(&frame).await.unwrap();

        let mut buf = vec![0u8; frame.encoded_len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &frame.encode()[..]);
    }

    #[tokio::test]
    async fn test_concurrent_frames_do_not_interleave() {
        let (client, mut server) = duplex(64);
        let writer = Arc::new(FrameWriter::new(client));

        let body = "x".repeat(500);
        let frame = Frame::from_values(&RequestHeader::new("svc.Big"), &body).unwrap();
        let frame_len = frame.encoded_len();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let writer = writer.clone();
            let frame = frame.clone();
            tasks.push(tokio::spawn(async move { writer.write_frame(&frame).await }));
        }

        let mut buf = vec![0u8; frame_len * 8];
        server.read_exact(&mut buf).await.unwrap();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let expected = frame.encode();
        for chunk in buf.chunks(frame_len) {
            assert_eq!(chunk, &expected[..]);
        }
    }

    #[tokio::test]
    async fn test_shutdown_signals_eof() {
        let (client, mut server) = duplex(64);
        let writer = FrameWriter::new(client);
        writer.shutdown().await.unwrap();

        let mut buf = Vec::new();
        assert_eq!(server.read_to_end(&mut buf).await.unwrap(), 0);
    }
}
