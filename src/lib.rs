//! # BlazeKV: A Redis-Subset In-Memory Key-Value Server
//!
//! BlazeKV reimplements the core of a widely used in-memory key-value store:
//! its wire protocol, an expiring keyspace, the binary snapshot format it
//! loads at startup, and the handshake a replica runs to bootstrap from a
//! master.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                             BlazeKV                                │
//! │                                                                    │
//! │  ┌────────────┐   ┌──────────────┐   ┌───────────────┐             │
//! │  │ TCP accept │──>│ Connection   │──>│ Command       │             │
//! │  │ (main.rs)  │   │ task (RESP)  │   │ dispatcher    │             │
//! │  └────────────┘   └──────────────┘   └───────┬───────┘             │
//! │                                              │                     │
//! │   ┌───────────────┐   ┌──────────────────────▼──────────────────┐  │
//! │   │ Snapshot      │──>│            StorageEngine                │  │
//! │   │ reader (once) │   │   sharded RwLock map, lazy + swept TTL  │  │
//! │   └───────────────┘   └──────────────────────▲──────────────────┘  │
//! │                                              │                     │
//! │   ┌───────────────────┐            ┌─────────┴─────────┐           │
//! │   │ Replica handshake │            │  Expiry sweeper   │           │
//! │   │ (startup, once)   │            │ (background task) │           │
//! │   └───────────────────┘            └───────────────────┘           │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `ECHO msg`
//! - `SET key value [PX|EX n]`, `GET key`, `DEL key`, `KEYS pattern`
//! - `CONFIG GET name`, `INFO [section]`
//! - `REPLCONF ...`, `PSYNC <id> <offset>`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP frame decoding and serialization
//! - [`storage`]: the concurrent keyspace with expiry, plus the sweeper
//! - [`snapshot`]: the binary snapshot reader (and stubbed writer)
//! - [`config`]: startup arguments and the instance environment
//! - [`commands`]: the closed command set and its executor
//! - [`connection`]: per-client serving loop
//! - [`replication`]: the replica bootstrap handshake
//!
//! ## Design Highlights
//!
//! ### Expiry, twice over
//!
//! A key with a TTL is never served past its deadline: reads check and evict
//! under the shard's write lock in one atomic step, and a background sweeper
//! reclaims expired keys that nobody reads. Neither path evicts early.
//!
//! ### Failure containment
//!
//! A malformed frame closes the offending connection; an arity failure or
//! unknown command is just an error reply. Only startup-time snapshot
//! corruption or a failed bind terminates the process.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod replication;
pub mod snapshot;
pub mod storage;

// Re-export the types most callers touch.
pub use commands::{Command, CommandHandler, Reply};
pub use config::{Environment, Role, ServerConfig};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{parse_frame, ParseError, RespValue};
pub use storage::{ExpirySweeper, StorageEngine};

/// Default listen port, shared with the reference implementation.
pub const DEFAULT_PORT: u16 = 6379;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
