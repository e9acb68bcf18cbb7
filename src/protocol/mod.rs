//! Wire Protocol Codec
//!
//! RESP framing for both directions of a connection: the incremental decoder
//! that turns accumulated socket bytes into [`RespValue`] frames, and the
//! serializer that turns reply values back into wire buffers.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` union and serialization
//! - `parser`: the incremental frame decoder
//!
//! ## Example
//!
//! ```
//! use blazekv::protocol::{parse_frame, RespValue};
//!
//! let bytes = b"*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n";
//! let (frame, consumed) = parse_frame(bytes).unwrap().unwrap();
//! assert_eq!(frame, RespValue::command(&["ECHO", "hi"]));
//! assert_eq!(consumed, bytes.len());
//! ```

pub mod parser;
pub mod types;

pub use parser::{parse_frame, ParseError, ParseResult};
pub use types::{serialize_snapshot_payload, RespValue};
