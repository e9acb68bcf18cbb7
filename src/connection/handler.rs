//! Per-Connection Serving Loop
//!
//! One task per accepted client, owning its socket exclusively and looping
//! read → decode → dispatch → reply until the peer closes or sends zero
//! bytes. TCP delivers opaque chunks with no one-command-per-read guarantee,
//! so incoming bytes accumulate in a `BytesMut` and frames are peeled off the
//! front as they complete; several pipelined commands in one chunk all get
//! answered, in order.
//!
//! ## Failure Containment
//!
//! A malformed frame is unrecoverable *for that connection*, since the byte
//! stream has lost sync, so the task logs and closes its own socket. An
//! arity error or unknown command is a healthy frame with a bad payload: the
//! dispatcher turns it into a SimpleError reply and the loop continues.
//! Nothing a single client sends can take down the server or corrupt the
//! keyspace.

use crate::commands::{CommandHandler, Reply};
use crate::protocol::{parse_frame, ParseError, RespValue};
use bytes::{Buf, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Read buffer growth ceiling (64 KB).
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial read buffer capacity.
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Server-wide connection counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Why a connection loop ended.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream can no longer be framed.
    #[error("protocol decode error: {0}")]
    Decode(#[from] ParseError),

    /// Clean close from the peer.
    #[error("client disconnected")]
    Disconnected,

    /// The peer closed mid-frame.
    #[error("connection closed with a partial frame pending")]
    TruncatedFrame,

    /// The client sent an implausibly large frame without completing it.
    #[error("read buffer limit exceeded")]
    BufferFull,
}

/// State for one client connection.
pub struct ConnectionHandler {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            commands,
            stats,
        }
    }

    /// Runs the connection to completion.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "client connected");
        let result = self.serve_loop().await;

        match &result {
            Err(ConnectionError::Disconnected) => {
                debug!(client = %self.addr, "client disconnected")
            }
            Err(ConnectionError::Io(e))
                if e.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "closing connection"),
            Ok(()) => {}
        }

        self.stats.connection_closed();
        result
    }

    async fn serve_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Drain every complete frame already buffered before reading
            // again, so pipelined commands answer without extra round trips.
            while let Some(frame) = self.next_frame()? {
                let reply = self.commands.handle_frame(frame);
                self.stats.command_processed();
                self.send_reply(&reply).await?;
            }
            self.fill_buffer().await?;
        }
    }

    /// Peels one complete frame off the front of the buffer.
    fn next_frame(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        match parse_frame(&self.buffer) {
            Ok(Some((frame, consumed))) => {
                self.buffer.advance(consumed);
                trace!(client = %self.addr, consumed, "decoded frame");
                Ok(Some(frame))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(client = %self.addr, error = %e, "undecodable frame");
                Err(ConnectionError::Decode(e))
            }
        }
    }

    async fn fill_buffer(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            return Err(ConnectionError::BufferFull);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::Disconnected)
            } else {
                Err(ConnectionError::TruncatedFrame)
            };
        }
        trace!(client = %self.addr, bytes = n, "read chunk");
        Ok(())
    }

    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = reply.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(client = %self.addr, bytes = bytes.len(), "sent reply");
        Ok(())
    }
}

/// Runs a client connection to completion, logging instead of propagating.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, commands, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::Disconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => debug!(client = %addr, error = %e, "connection ended with error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, ServerConfig};
    use crate::storage::StorageEngine;
    use tokio::net::TcpListener;

    async fn spawn_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let env = Arc::new(Environment::new(&ServerConfig::default()));
        let stats = Arc::new(ConnectionStats::new());

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let commands = CommandHandler::new(Arc::clone(&storage), Arc::clone(&env));
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    commands,
                    Arc::clone(&stats),
                ));
            }
        });

        addr
    }

    async fn read_some(client: &mut TcpStream, want: usize) -> Vec<u8> {
        let mut collected = Vec::new();
        let mut chunk = [0u8; 1024];
        while collected.len() < want {
            let n = tokio::time::timeout(
                tokio::time::Duration::from_secs(2),
                client.read(&mut chunk),
            )
            .await
            .expect("reply timed out")
            .unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&chunk[..n]);
        }
        collected
    }

    #[tokio::test]
    async fn ping_round_trips() {
        let addr = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_some(&mut client, 7).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn set_then_get_over_the_wire() {
        let addr = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$5\r\nblaze\r\n")
            .await
            .unwrap();
        assert_eq!(read_some(&mut client, 5).await, b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();
        assert_eq!(read_some(&mut client, 11).await, b"$5\r\nblaze\r\n");
    }

    #[tokio::test]
    async fn pipelined_commands_answer_in_order() {
        let addr = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(
                b"*3\r\n$3\r\nSET\r\n$2\r\nk1\r\n$2\r\nv1\r\n\
                  *3\r\n$3\r\nSET\r\n$2\r\nk2\r\n$2\r\nv2\r\n\
                  *2\r\n$3\r\nGET\r\n$2\r\nk1\r\n",
            )
            .await
            .unwrap();

        let reply = read_some(&mut client, 18).await;
        assert_eq!(reply, b"+OK\r\n+OK\r\n$2\r\nv1\r\n");
    }

    #[tokio::test]
    async fn unknown_command_keeps_the_connection_open() {
        let addr = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$6\r\nFOOBAR\r\n").await.unwrap();
        assert_eq!(read_some(&mut client, 18).await, b"-Unknown command\r\n");

        // Still serving.
        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_some(&mut client, 7).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn undecodable_bytes_close_only_that_connection() {
        let addr = spawn_server().await;
        let mut bad = TcpStream::connect(addr).await.unwrap();

        bad.write_all(b"@nonsense\r\n").await.unwrap();
        // Server closes: the next read returns EOF.
        let mut sink = [0u8; 16];
        let n = bad.read(&mut sink).await.unwrap();
        assert_eq!(n, 0);

        // A fresh client is unaffected.
        let mut good = TcpStream::connect(addr).await.unwrap();
        good.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        assert_eq!(read_some(&mut good, 7).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn psync_writes_header_then_length_prefixed_snapshot() {
        let addr = spawn_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$5\r\nPSYNC\r\n$1\r\n?\r\n$2\r\n-1\r\n")
            .await
            .unwrap();

        let reply = read_some(&mut client, 32).await;
        assert!(reply.starts_with(b"+FULLRESYNC "));

        let header_end = reply.windows(2).position(|w| w == b"\r\n").unwrap() + 2;
        assert_eq!(reply[header_end], b'$');
        let len_line_end = header_end
            + reply[header_end..]
                .windows(2)
                .position(|w| w == b"\r\n")
                .unwrap();
        let declared: usize = std::str::from_utf8(&reply[header_end + 1..len_line_end])
            .unwrap()
            .parse()
            .unwrap();

        // Collect the rest of the payload, which has no trailing CRLF.
        let mut payload = reply[len_line_end + 2..].to_vec();
        if payload.len() < declared {
            let rest = read_some(&mut client, declared - payload.len()).await;
            payload.extend_from_slice(&rest);
        }
        assert_eq!(payload.len(), declared);
        assert!(payload.starts_with(b"REDIS"));
    }
}
