//! Server-side codec: reads request frames, writes response frames.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};

use super::{CodecConfig, JsonCodec};
use crate::error::Result;
use crate::protocol::{
    Frame, FrameReader, RequestHeader, ResponseHeader, ResponseStatus, SegmentKind, StatusPolicy,
};
use crate::writer::FrameWriter;

/// Codec for the serving side of a connection.
pub struct ServerCodec<R, W> {
    reader: FrameReader<R>,
    responder: ResponseSender<W>,
}

impl<S: AsyncRead + AsyncWrite> ServerCodec<ReadHalf<S>, WriteHalf<S>> {
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

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> ServerCodec<R, W> {
    /// Create a codec from separate read and write halves.
    pub fn from_parts(reader: R, writer: W, config: CodecConfig) -> Self {
        Self {
            reader: FrameReader::with_max_segment_size(reader, config.max_segment_size),
            responder: ResponseSender {
                writer: Arc::new(FrameWriter::new(writer)),
                policy: config.status_policy,
            },
        }
    }

    /// Get a cloneable handle for writing responses on this connection.
    pub fn responder(&self) -> ResponseSender<W> {
        self.responder.clone()
    }

    /// Get the status policy applied to written responses.
    pub fn status_policy(&self) -> StatusPolicy {
        self.responder.policy
    }

    /// Read the next request header and return the requested method name.
    ///
    /// Returns [`SnowError::ConnectionClosed`] when the peer closed the
    /// connection cleanly between frames.
    ///
    /// [`SnowError::ConnectionClosed`]: crate::error::SnowError::ConnectionClosed
    pub async fn read_request_header(&mut self) -> Result<String> {
        let header: RequestHeader = self.reader.read_json(SegmentKind::RequestHeader).await?;
        Ok(header.method)
    }

    /// Read the request body and decode it as `T`.
    ///
    /// A decode error fails only this call; the stream is already positioned
    /// at the next frame.
    pub async fn read_request_body<T: DeserializeOwned>(&mut self) -> Result<T> {
        self.reader.read_json(SegmentKind::RequestBody).await
    }

    /// Read the request body as raw JSON bytes.
    pub async fn read_request_body_raw(&mut self) -> Result<Bytes> {
        self.reader.read_segment(SegmentKind::RequestBody).await
    }

    /// Consume the request body without decoding it.
    pub async fn skip_request_body(&mut self) -> Result<()> {
        self.reader.skip_segment(SegmentKind::RequestBody).await?;
        Ok(())
    }

    /// Write one response frame and flush it.
    pub async fn write_response<T: Serialize + ?Sized>(
        &self,
        status: &ResponseStatus,
        result: &T,
    ) -> Result<()> {
        self.responder.write_response(status, result).await
    }

    /// Close the connection without flushing buffered writes.
    pub async fn close(self) -> Result<()> {
        self.responder.shutdown().await
    }
}

/// Cloneable response writer sharing a [`ServerCodec`]'s connection lock.
pub struct ResponseSender<W> {
    writer: Arc<FrameWriter<W>>,
    policy: StatusPolicy,
}

impl<W> Clone for ResponseSender<W> {
    fn clone(&self) -> Self {
        Self {
            writer: self.writer.clone(),
            policy: self.policy,
        }
    }
}

impl<W: AsyncWrite + Unpin> ResponseSender<W> {
    /// Write one response frame and flush it.
    ///
    /// The header is `200 OK` unless `status` carries an error and the
    /// policy is [`StatusPolicy::Report`], in which case it is `500` with the
    /// error text.
    pub async fn write_response<T: Serialize + ?Sized>(
        &self,
        status: &ResponseStatus,
        result: &T,
    ) -> Result<()> {
        let header = ResponseHeader::for_status(status, self.policy);
        let frame = Frame::response(&header, result)?;
        self.writer.write_frame(&frame).await
    }

    /// Write a pre-encoded JSON result.
    pub async fn write_response_raw(&self, status: &ResponseStatus, result: Bytes) -> Result<()> {
        let header = ResponseHeader::for_status(status, self.policy);
        let frame = Frame::new(Bytes::from(JsonCodec::encode(&header)?), result);
        self.writer.write_frame(&frame).await
    }

    /// Shut the write half of the connection down.
    pub async fn shutdown(&self) -> Result<()> {
        self.writer.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnowError;
    use crate::protocol::build_frame;
    use serde::Deserialize;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[derive(Deserialize, PartialEq, Debug)]
    struct Args {
        a: i32,
        b: i32,
    }

    fn ok_frame(body: &[u8]) -> Bytes {
        build_frame(br#"{"return_code":200,"message":"OK"}"#, body)
    }

    #[tokio::test]
    async fn test_read_request() {
        let (stream, mut peer) = duplex(4096);
        let mut codec = ServerCodec::new(stream);
        peer.write_all(&build_frame(br#"{"interface_name":"calc.Add"}"#, br#"{"a":1,"b":2}"#))
            .await
            .unwrap();

        assert_eq!(codec.read_request_header().await.unwrap(), "calc.Add");
        let args: Args = codec.read_request_body().await.unwrap();
        assert_eq!(args, Args { a: 1, b: 2 });
    }

    #[tokio::test]
    async fn test_read_request_multibyte_and_escapes() {
        let (stream, mut peer) = duplex(4096);
        let mut codec = ServerCodec::new(stream);

        let header = "{\"interface_name\":\"svc.\u{dc}n\u{ef}\"}";
        let body = "{\"s\":\"h\u{e9}llo\\r\\n\u{1F600}\",\"n\":[1.5,-2,null]}";
        let mut bytes = build_frame(header.as_bytes(), body.as_bytes()).to_vec();
        bytes.extend_from_slice(&build_frame(br#"{"interface_name":"calc.Add"}"#, b"{}"));
        peer.write_all(&bytes).await.unwrap();

        assert_eq!(codec.read_request_header().await.unwrap(), "svc.\u{dc}n\u{ef}");
        let value: serde_json::Value = codec.read_request_body().await.unwrap();
        assert_eq!(
            value,
            serde_json::json!({"s": "h\u{e9}llo\r\n\u{1F600}", "n": [1.5, -2, null]})
        );
        assert_eq!(codec.read_request_header().await.unwrap(), "calc.Add");
    }

    #[tokio::test]
    async fn test_skip_body_then_next_request() {
        let (stream, mut peer) = duplex(4096);
        let mut codec = ServerCodec::new(stream);

        let mut bytes = build_frame(br#"{"interface_name":"x.Unknown"}"#, br#"{"big":[1,2,3]}"#).to_vec();
        bytes.extend_from_slice(&build_frame(br#"{"interface_name":"calc.Add"}"#, b"[]"));
        peer.write_all(&bytes).await.unwrap();

        assert_eq!(codec.read_request_header().await.unwrap(), "x.Unknown");
        codec.skip_request_body().await.unwrap();
        assert_eq!(codec.read_request_header().await.unwrap(), "calc.Add");
        assert_eq!(&codec.read_request_body_raw().await.unwrap()[..], b"[]");
    }

    #[tokio::test]
    async fn test_write_success_response() {
        let (stream, mut peer) = duplex(4096);
        let codec = ServerCodec::new(stream);

        codec
            .write_response(&ResponseStatus::ok(), &serde_json::json!({"c": 3}))
            .await
            .unwrap();

        let expected = ok_frame(br#"{"c":3}"#);
        let mut buf = vec![0u8; expected.len()];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_write_error_response_reports_500() {
        let (stream, mut peer) = duplex(4096);
        let codec = ServerCodec::new(stream);
        assert_eq!(codec.status_policy(), StatusPolicy::Report);

        codec
            .write_response(&ResponseStatus::error("division by zero"), &())
            .await
            .unwrap();

        let expected = build_frame(
            br#"{"return_code":500,"message":"division by zero"}"#,
            b"null",
        );
        let mut buf = vec![0u8; expected.len()];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_always_ok_policy_drops_error() {
        let (stream, mut peer) = duplex(4096);
        let config = CodecConfig {
            status_policy: StatusPolicy::AlwaysOk,
            ..CodecConfig::default()
        };
        let codec = ServerCodec::with_config(stream, config);

        codec
            .responder()
            .write_response(&ResponseStatus::error("division by zero"), &())
            .await
            .unwrap();

        let expected = ok_frame(b"null");
        let mut buf = vec![0u8; expected.len()];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_write_response_raw() {
        let (stream, mut peer) = duplex(4096);
        let codec = ServerCodec::new(stream);

        codec
            .responder()
            .write_response_raw(&ResponseStatus::ok(), Bytes::from_static(b"[true]"))
            .await
            .unwrap();

        let expected = ok_frame(b"[true]");
        let mut buf = vec![0u8; expected.len()];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &expected[..]);
    }

    #[tokio::test]
    async fn test_negative_body_length_is_framing_error() {
        let (stream, mut peer) = duplex(4096);
        let mut codec = ServerCodec::new(stream);
        peer.write_all(b"2\r\n{}\r\n-7\r\n").await.unwrap();

        assert_eq!(codec.read_request_header().await.unwrap(), "");
        let err = codec.read_request_body_raw().await.unwrap_err();
        assert!(matches!(err, SnowError::Framing(_)));
    }

    #[tokio::test]
    async fn test_peer_close_mid_read_errors() {
        let (stream, mut peer) = duplex(4096);
        let mut codec = ServerCodec::new(stream);
        peer.write_all(b"29\r\n{\"interface_name\"").await.unwrap();
        drop(peer);

        let err = codec.read_request_header().await.unwrap_err();
        assert!(matches!(err, SnowError::Io(_)));
    }
}
