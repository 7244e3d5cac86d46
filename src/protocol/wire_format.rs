//! Wire format constants, segment headers and length-line parsing.
//!
//! A frame is two length-prefixed JSON segments written back to back:
//! ```text
//! <header-len>\r\n<header-json>\r\n<body-len>\r\n<body-json>\r\n\r\n
//! ```
//!
//! Lengths are unsigned ASCII decimals. The header segment ends with one
//! CRLF, the body segment with two.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnowError};

/// Line terminator used after length prefixes and payloads.
pub const CRLF: &[u8] = b"\r\n";

/// Trailer bytes after a header payload.
pub const HEADER_TRAILER_LEN: usize = 2;

/// Trailer bytes after a body payload (two consecutive CRLFs).
pub const BODY_TRAILER_LEN: usize = 4;

/// Return code for a successful call.
pub const STATUS_OK: i64 = 200;

/// Return code written for a failed call.
pub const STATUS_ERROR: i64 = 500;

/// Message that accompanies [`STATUS_OK`].
pub const STATUS_OK_MESSAGE: &str = "OK";

/// Default maximum payload size of a single segment (64 MB).
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 64 * 1024 * 1024;

/// Longest accepted length line, CRLF included.
pub const MAX_LENGTH_LINE_LEN: usize = 32;

/// Which segment is being read; selects the trailer size and error wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    RequestHeader,
    RequestBody,
    ResponseHeader,
    ResponseBody,
}

impl SegmentKind {
    /// Number of terminator bytes following the payload.
    #[inline]
    pub fn trailer_len(self) -> usize {
        match self {
            SegmentKind::RequestHeader | SegmentKind::ResponseHeader => HEADER_TRAILER_LEN,
            SegmentKind::RequestBody | SegmentKind::ResponseBody => BODY_TRAILER_LEN,
        }
    }

    /// Check if this is a body segment.
    #[inline]
    pub fn is_body(self) -> bool {
        matches!(self, SegmentKind::RequestBody | SegmentKind::ResponseBody)
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SegmentKind::RequestHeader => "request header",
            SegmentKind::RequestBody => "request body",
            SegmentKind::ResponseHeader => "response header",
            SegmentKind::ResponseBody => "response body",
        })
    }
}

/// Header of a request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Fully qualified `service.method` name.
    #[serde(rename = "interface_name", default)]
    pub method: String,
}

impl RequestHeader {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
        }
    }
}

/// Header of a response frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    #[serde(rename = "return_code", default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

impl ResponseHeader {
    /// `200 OK` header.
    pub fn ok() -> Self {
        Self {
            code: STATUS_OK,
            message: STATUS_OK_MESSAGE.to_string(),
        }
    }

    /// `500` header carrying an error message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: STATUS_ERROR,
            message: message.into(),
        }
    }

    /// Derive the header for an invocation outcome under the given policy.
    pub fn for_status(status: &ResponseStatus, policy: StatusPolicy) -> Self {
        match (policy, status.error_message()) {
            (StatusPolicy::Report, Some(message)) => Self::error(message),
            (StatusPolicy::AlwaysOk, Some(message)) => {
                tracing::debug!(error = message, "Dropping handler error from response header");
                Self::ok()
            }
            (_, None) => Self::ok(),
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.code == STATUS_OK
    }

    /// Convert a non-200 header into [`SnowError::Status`].
    pub fn into_result(self) -> Result<()> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(SnowError::Status {
                code: self.code,
                message: self.message,
            })
        }
    }
}

/// Outcome of a method invocation, as handed to the response writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseStatus {
    error: Option<String>,
}

impl ResponseStatus {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
        }
    }

    /// The error message, if the invocation failed.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl<T> From<&Result<T>> for ResponseStatus {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::error(e.to_string()),
        }
    }
}

/// How handler errors are reflected in the response header.
///
/// Deployed servers of this protocol decide the status before the error is
/// known and so answer every call with `200 OK`. `AlwaysOk` keeps that
/// behavior for peers that rely on it; `Report` sends `500` with the error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    #[default]
    Report,
    AlwaysOk,
}

/// Parse a length line (digits followed by CRLF) into a payload length.
///
/// # Errors
///
/// Returns [`SnowError::Framing`] when the line is empty, lacks its CRLF,
/// carries a sign or non-digit, overflows, or exceeds `max_len`.
pub fn parse_length_line(line: &[u8], kind: SegmentKind, max_len: usize) -> Result<usize> {
    if line.len() <= CRLF.len() {
        return Err(SnowError::Framing(format!("incomplete {}", kind)));
    }
    if !line.ends_with(CRLF) {
        return Err(SnowError::Framing(format!(
            "{} length line is not CRLF terminated",
            kind
        )));
    }

    let digits = &line[..line.len() - CRLF.len()];
    if let Some(rest) = digits.strip_prefix(b"-") {
        if !rest.is_empty() && rest.iter().all(u8::is_ascii_digit) {
            return Err(SnowError::Framing(format!("negative {} length", kind)));
        }
    }
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(SnowError::Framing(format!(
            "invalid {} length {:?}",
            kind,
            String::from_utf8_lossy(digits)
        )));
    }

    // All ASCII digits, so the only possible failure is overflow.
    let len: usize = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| SnowError::Framing(format!("{} length out of range", kind)))?;

    if len > max_len {
        return Err(SnowError::Framing(format!(
            "{} length {} exceeds maximum {}",
            kind, len, max_len
        )));
    }

    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &[u8]) -> Result<usize> {
        parse_length_line(line, SegmentKind::RequestHeader, DEFAULT_MAX_SEGMENT_SIZE)
    }

    #[test]
    fn test_parse_valid_lengths() {
        assert_eq!(parse(b"0\r\n").unwrap(), 0);
        assert_eq!(parse(b"27\r\n").unwrap(), 27);
        assert_eq!(parse(b"007\r\n").unwrap(), 7);
    }

    #[test]
    fn test_parse_negative_rejected() {
        let err = parse(b"-5\r\n").unwrap_err();
        assert!(matches!(err, SnowError::Framing(_)));
        assert!(err.to_string().contains("negative request header length"));
    }

    #[test]
    fn test_parse_non_numeric_rejected() {
        for line in [&b"abc\r\n"[..], b"+5\r\n", b"1 2\r\n", b"-\r\n", b"5x\r\n"] {
            let err = parse(line).unwrap_err();
            assert!(
                err.to_string().contains("invalid request header length"),
                "unexpected error for {:?}: {}",
                line,
                err
            );
        }
    }

    #[test]
    fn test_parse_incomplete_line() {
        assert!(parse(b"\r\n").unwrap_err().to_string().contains("incomplete"));
        assert!(parse(b"\n").unwrap_err().to_string().contains("incomplete"));
    }

    #[test]
    fn test_parse_missing_cr() {
        let err = parse(b"12\n").unwrap_err();
        assert!(err.to_string().contains("not CRLF terminated"));
    }

    #[test]
    fn test_parse_overflow_and_max() {
        let err = parse(b"99999999999999999999999\r\n").unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let err = parse_length_line(b"101\r\n", SegmentKind::ResponseBody, 100).unwrap_err();
        assert!(err.to_string().contains("response body length 101 exceeds maximum 100"));
    }

    #[test]
    fn test_trailer_lengths() {
        assert_eq!(SegmentKind::RequestHeader.trailer_len(), 2);
        assert_eq!(SegmentKind::ResponseHeader.trailer_len(), 2);
        assert_eq!(SegmentKind::RequestBody.trailer_len(), 4);
        assert_eq!(SegmentKind::ResponseBody.trailer_len(), 4);
        assert!(SegmentKind::ResponseBody.is_body());
        assert!(!SegmentKind::RequestHeader.is_body());
    }

    #[test]
    fn test_request_header_wire_name() {
        let json = serde_json::to_string(&RequestHeader::new("calc.Add")).unwrap();
        assert_eq!(json, r#"{"interface_name":"calc.Add"}"#);

        let parsed: RequestHeader =
            serde_json::from_str(r#"{"interface_name":"calc.Add","seq":3}"#).unwrap();
        assert_eq!(parsed.method, "calc.Add");
    }

    #[test]
    fn test_response_header_wire_names() {
        let json = serde_json::to_string(&ResponseHeader::ok()).unwrap();
        assert_eq!(json, r#"{"return_code":200,"message":"OK"}"#);

        let parsed: ResponseHeader = serde_json::from_str(r#"{"return_code":404}"#).unwrap();
        assert_eq!(parsed.code, 404);
        assert_eq!(parsed.message, "");
    }

    #[test]
    fn test_header_for_status_report() {
        let ok = ResponseHeader::for_status(&ResponseStatus::ok(), StatusPolicy::Report);
        assert_eq!(ok, ResponseHeader::ok());

        let failed =
            ResponseHeader::for_status(&ResponseStatus::error("boom"), StatusPolicy::Report);
        assert_eq!(failed.code, STATUS_ERROR);
        assert_eq!(failed.message, "boom");
    }

    #[test]
    fn test_header_for_status_always_ok_drops_error() {
        let header =
            ResponseHeader::for_status(&ResponseStatus::error("boom"), StatusPolicy::AlwaysOk);
        assert_eq!(header, ResponseHeader::ok());
    }

    #[test]
    fn test_into_result() {
        assert!(ResponseHeader::ok().into_result().is_ok());
        match ResponseHeader::error("nope").into_result() {
            Err(SnowError::Status { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_status_from_result() {
        let ok: Result<i32> = Ok(1);
        assert_eq!(ResponseStatus::from(&ok), ResponseStatus::ok());

        let err: Result<i32> = Err(SnowError::handler("bad input"));
        assert_eq!(
            ResponseStatus::from(&err).error_message(),
            Some("bad input")
        );
    }
}
