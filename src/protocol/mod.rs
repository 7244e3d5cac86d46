//! Protocol module - wire format, framing, and segment reading.
//!
//! This module implements the text framing of the data stream:
//! - length-line parsing and request/response header types
//! - frame building (header segment + body segment)
//! - buffered segment reader with the 2/4 byte trailer convention

mod frame;
mod reader;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use reader::FrameReader;
pub use wire_format::{
    parse_length_line, RequestHeader, ResponseHeader, ResponseStatus, SegmentKind, StatusPolicy,
    BODY_TRAILER_LEN, CRLF, DEFAULT_MAX_SEGMENT_SIZE, HEADER_TRAILER_LEN, MAX_LENGTH_LINE_LEN,
    STATUS_ERROR, STATUS_OK, STATUS_OK_MESSAGE,
};
