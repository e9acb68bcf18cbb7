//! Replica Bootstrap Handshake
//!
//! The one-shot conversation a replica holds with its master at startup,
//! over a dedicated outbound connection, before it serves anything stale:
//!
//! 1. `PING` to check anyone is there;
//! 2. `REPLCONF listening-port <port>` to advertise our own port;
//! 3. `REPLCONF capa eof` to advertise capabilities;
//! 4. `PSYNC ? -1` to request a full resync, then receive the `FULLRESYNC`
//!    line and the length-prefixed snapshot payload (no trailing CRLF).
//!
//! The sequence is strictly linear: each step blocks until its reply frame
//! arrives, there is no retry or backoff, and any failure (connect, write,
//! read, decode, or an error reply) aborts the bootstrap with the failing
//! step named. Command streaming after the handshake is out of scope; the
//! caller decides what to do with the snapshot bytes.

use crate::protocol::{parse_frame, ParseError, RespValue};
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// A handshake-step failure. Fatal to the bootstrap; never retried.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("failed to connect to master at {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("i/o failure during {step}: {source}")]
    Io {
        step: &'static str,
        source: std::io::Error,
    },

    #[error("master closed the connection during {step}")]
    ConnectionClosed { step: &'static str },

    #[error("undecodable reply to {step}: {source}")]
    BadReply {
        step: &'static str,
        source: ParseError,
    },

    #[error("master rejected {step}: {message}")]
    Rejected { step: &'static str, message: String },

    #[error("unexpected reply to {step}")]
    UnexpectedReply { step: &'static str },
}

/// What a completed handshake hands back.
#[derive(Debug)]
pub struct HandshakeOutcome {
    /// The `FULLRESYNC <replid> <offset>` line verbatim.
    pub fullresync: String,
    /// The snapshot payload the master shipped.
    pub snapshot: Bytes,
}

/// Runs the full bootstrap conversation against `master`.
pub async fn run(
    master: &(String, u16),
    listening_port: u16,
) -> Result<HandshakeOutcome, HandshakeError> {
    let addr = format!("{}:{}", master.0, master.1);
    info!(master = %addr, "starting replica handshake");

    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|source| HandshakeError::Connect {
            addr: addr.clone(),
            source,
        })?;
    let mut conversation = Conversation::new(stream);

    conversation.request("PING", &["PING"]).await?;

    let port = listening_port.to_string();
    conversation
        .request(
            "REPLCONF listening-port",
            &["REPLCONF", "listening-port", &port],
        )
        .await?;

    conversation
        .request("REPLCONF capa", &["REPLCONF", "capa", "eof"])
        .await?;

    let reply = conversation.request("PSYNC", &["PSYNC", "?", "-1"]).await?;
    let fullresync = match reply {
        RespValue::SimpleString(line) if line.starts_with("FULLRESYNC ") => line,
        _ => return Err(HandshakeError::UnexpectedReply { step: "PSYNC" }),
    };
    debug!(reply = %fullresync, "master acknowledged full resync");

    let snapshot = conversation.read_snapshot("PSYNC snapshot").await?;
    info!(
        snapshot_bytes = snapshot.len(),
        "replica handshake complete"
    );

    Ok(HandshakeOutcome {
        fullresync,
        snapshot,
    })
}

/// The request/reply stream with the master.
struct Conversation {
    stream: TcpStream,
    buffer: BytesMut,
}

impl Conversation {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Sends one command frame and blocks for its reply.
    async fn request(
        &mut self,
        step: &'static str,
        parts: &[&str],
    ) -> Result<RespValue, HandshakeError> {
        let frame = RespValue::command(parts).serialize();
        self.stream
            .write_all(&frame)
            .await
            .map_err(|source| HandshakeError::Io { step, source })?;

        let reply = self.next_frame(step).await?;
        if let RespValue::Error(message) = reply {
            return Err(HandshakeError::Rejected { step, message });
        }
        Ok(reply)
    }

    /// Reads until one complete frame is decodable.
    async fn next_frame(&mut self, step: &'static str) -> Result<RespValue, HandshakeError> {
        loop {
            match parse_frame(&self.buffer) {
                Ok(Some((frame, consumed))) => {
                    self.buffer.advance(consumed);
                    return Ok(frame);
                }
                Ok(None) => {}
                Err(source) => return Err(HandshakeError::BadReply { step, source }),
            }
            self.fill(step).await?;
        }
    }

    /// Reads the snapshot payload: `$<len>\r\n` then exactly `len` raw bytes.
    ///
    /// This is the one frame on the wire with no trailing CRLF, so it cannot
    /// go through the ordinary decoder.
    async fn read_snapshot(&mut self, step: &'static str) -> Result<Bytes, HandshakeError> {
        let (declared, header_len) = loop {
            if let Some(parsed) = self.try_parse_snapshot_header(step)? {
                break parsed;
            }
            self.fill(step).await?;
        };

        while self.buffer.len() < header_len + declared {
            self.fill(step).await?;
        }
        self.buffer.advance(header_len);
        Ok(self.buffer.split_to(declared).freeze())
    }

    fn try_parse_snapshot_header(
        &self,
        step: &'static str,
    ) -> Result<Option<(usize, usize)>, HandshakeError> {
        let Some(&first) = self.buffer.first() else {
            return Ok(None);
        };
        if first != b'$' {
            return Err(HandshakeError::UnexpectedReply { step });
        }
        let Some(line_end) = self.buffer.windows(2).position(|w| w == b"\r\n") else {
            return Ok(None);
        };
        let declared = std::str::from_utf8(&self.buffer[1..line_end])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or(HandshakeError::UnexpectedReply { step })?;
        Ok(Some((declared, line_end + 2)))
    }

    async fn fill(&mut self, step: &'static str) -> Result<(), HandshakeError> {
        let n = self
            .stream
            .read_buf(&mut self.buffer)
            .await
            .map_err(|source| HandshakeError::Io { step, source })?;
        if n == 0 {
            return Err(HandshakeError::ConnectionClosed { step });
        }
        Ok(())
    }
}
