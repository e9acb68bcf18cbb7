//! Client Connection Layer
//!
//! The boundary between raw sockets and the dispatcher. The accept loop in
//! `main` spawns one task per client; each task owns its stream, accumulates
//! chunks into frames, and writes reply buffers back in order. Per-connection
//! failures close that connection and nothing else.

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
