//! Incremental RESP Decoder
//!
//! Decodes wire frames out of a byte buffer that fills up chunk by chunk.
//! TCP gives no one-command-per-read guarantee, so the decoder distinguishes
//! three outcomes:
//!
//! - `Ok(Some((value, consumed)))`: a complete frame; drop `consumed` bytes
//!   from the front of the buffer and dispatch the value.
//! - `Ok(None)`: the buffer holds a prefix of a frame; read more bytes.
//! - `Err(ParseError)`: the bytes can never become a valid frame, and the
//!   connection that sent them is beyond saving.
//!
//! Bulk string payloads are consumed by declared length, never by scanning
//! for a terminator, so embedded CR/LF bytes pass through untouched.

use crate::protocol::types::{tag, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Decode failure: the frame is malformed, not merely incomplete.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// First byte is not one of the known type tags.
    #[error("unrecognized type tag: {0:#04x}")]
    UnknownTag(u8),

    /// A count or integer line did not parse as a number.
    #[error("invalid integer in frame: {0:?}")]
    InvalidInteger(String),

    /// A simple string or error line was not UTF-8.
    #[error("invalid UTF-8 in frame")]
    InvalidUtf8,

    /// A declared bulk length other than -1 was negative.
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// A declared element count other than -1 was negative.
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// A declared length exceeds the allowed maximum.
    #[error("declared length {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Structural violation, e.g. a bulk payload not followed by CRLF.
    #[error("protocol violation: {0}")]
    Malformed(&'static str),

    /// Arrays nested beyond the supported depth.
    #[error("frame nesting too deep")]
    NestingTooDeep,
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum declared size of a single bulk string (512 MB, the reference cap).
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth.
const MAX_DEPTH: usize = 32;

/// Attempts to decode one frame from the front of `buf`.
pub fn parse_frame(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    parse_value(buf, 0)
}

fn parse_value(buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
    if depth > MAX_DEPTH {
        return Err(ParseError::NestingTooDeep);
    }
    let Some(&tag_byte) = buf.first() else {
        return Ok(None);
    };

    match tag_byte {
        tag::SIMPLE_STRING => parse_line(buf, RespValue::SimpleString),
        tag::SIMPLE_ERROR => parse_line(buf, RespValue::Error),
        tag::INTEGER => parse_integer(buf),
        tag::BULK_STRING => parse_bulk_string(buf),
        tag::ARRAY => parse_array(buf, depth),
        other => Err(ParseError::UnknownTag(other)),
    }
}

/// Decodes a line-framed value (`+...` / `-...`) via the given constructor.
fn parse_line(
    buf: &[u8],
    build: fn(String) -> RespValue,
) -> ParseResult<Option<(RespValue, usize)>> {
    let Some(end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&buf[1..1 + end]).map_err(|_| ParseError::InvalidUtf8)?;
    Ok(Some((build(text.to_string()), 1 + end + 2)))
}

fn parse_integer(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    let Some(end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let n = parse_int_line(&buf[1..1 + end])?;
    Ok(Some((RespValue::Integer(n), 1 + end + 2)))
}

fn parse_bulk_string(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    let Some(len_end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let declared = parse_int_line(&buf[1..1 + len_end])?;

    // `$-1\r\n` is the null bulk string.
    if declared == -1 {
        return Ok(Some((RespValue::Null, 1 + len_end + 2)));
    }
    if declared < 0 {
        return Err(ParseError::InvalidBulkLength(declared));
    }
    let len = declared as usize;
    if len > MAX_BULK_SIZE {
        return Err(ParseError::FrameTooLarge {
            size: len,
            max: MAX_BULK_SIZE,
        });
    }

    let payload_start = 1 + len_end + 2;
    let total = payload_start + len + 2;
    if buf.len() < total {
        return Ok(None);
    }
    if &buf[payload_start + len..total] != CRLF {
        return Err(ParseError::Malformed("bulk payload not followed by CRLF"));
    }

    let payload = Bytes::copy_from_slice(&buf[payload_start..payload_start + len]);
    Ok(Some((RespValue::BulkString(payload), total)))
}

fn parse_array(buf: &[u8], depth: usize) -> ParseResult<Option<(RespValue, usize)>> {
    let Some(count_end) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let declared = parse_int_line(&buf[1..1 + count_end])?;

    if declared == -1 {
        return Ok(Some((RespValue::Null, 1 + count_end + 2)));
    }
    if declared < 0 {
        return Err(ParseError::InvalidArrayLength(declared));
    }

    let count = declared as usize;
    let mut elements = Vec::with_capacity(count.min(64));
    let mut consumed = 1 + count_end + 2;

    for _ in 0..count {
        match parse_value(&buf[consumed..], depth + 1)? {
            Some((value, used)) => {
                elements.push(value);
                consumed += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((RespValue::Array(elements), consumed)))
}

fn parse_int_line(line: &[u8]) -> ParseResult<i64> {
    let text = std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;
    text.parse()
        .map_err(|_| ParseError::InvalidInteger(text.to_string()))
}

/// Position of the first CRLF in `buf`, if any.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
