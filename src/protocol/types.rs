//! RESP Wire Values
//!
//! The type layer of the wire protocol: a tagged union covering the value
//! kinds BlazeKV speaks, and their serialization back to the wire.
//!
//! ## Wire Format
//!
//! Every value starts with a one-byte type tag and lines end with CRLF:
//!
//! - `+` Simple String: `+OK\r\n`
//! - `-` Simple Error: `-Unknown command\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n`, null form `$-1\r\n`
//! - `*` Array: `*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n`
//!
//! Bulk string payloads are framed purely by their declared length, so they
//! may contain CR and LF bytes. The remaining RESP3 tags (`_`, `#`, `,`, `%`,
//! ...) are reserved by the protocol but unused here.
//!
//! One framing exists outside the union: the snapshot payload a master sends
//! after `FULLRESYNC` is a length-prefixed bulk *without* the trailing CRLF.
//! [`serialize_snapshot_payload`] emits that form.

use bytes::Bytes;

/// The CRLF line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// Type tag bytes.
pub mod tag {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const SIMPLE_ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A decoded wire value.
///
/// Used for both incoming command frames and outgoing replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary-safe line string. Cannot contain CRLF.
    SimpleString(String),

    /// Error line, rendered by clients as an error condition.
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe string, framed by declared length.
    BulkString(Bytes),

    /// The null bulk string (`$-1\r\n`, no payload).
    Null,

    /// Ordered sequence; elements encode independently and contiguously.
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// The canonical `+OK` reply.
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Builds the Array-of-BulkStrings form every command frame uses.
    pub fn command(parts: &[&str]) -> Self {
        RespValue::Array(
            parts
                .iter()
                .map(|p| RespValue::BulkString(Bytes::copy_from_slice(p.as_bytes())))
                .collect(),
        )
    }

    /// Serializes the value to its wire encoding.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes into an existing buffer, avoiding an allocation per value.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => {
                buf.push(tag::SIMPLE_STRING);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Error(s) => {
                buf.push(tag::SIMPLE_ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.push(tag::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => {
                buf.push(tag::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.push(tag::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.push(tag::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    /// Extracts text from SimpleString or (UTF-8) BulkString.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Extracts the raw payload of a BulkString.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }
}

/// Serializes a raw snapshot payload: `$<len>\r\n<payload>` with no trailing
/// CRLF. The binary bytes are framed by the declared length alone.
pub fn serialize_snapshot_payload(payload: &[u8], buf: &mut Vec<u8>) {
    buf.push(tag::BULK_STRING);
    buf.extend_from_slice(payload.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(payload);
}
