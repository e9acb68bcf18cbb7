//! Replication
//!
//! The replica side of bootstrap: a one-shot handshake that ends with the
//! master's snapshot payload in hand. The master side (answering `REPLCONF`
//! and serving `FULLRESYNC` + snapshot on `PSYNC`) lives in the command
//! dispatcher, where those commands arrive like any other.

pub mod handshake;

pub use handshake::{HandshakeError, HandshakeOutcome};
