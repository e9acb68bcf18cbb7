//! Command Dispatch
//!
//! The layer between decoded wire frames and the keyspace:
//!
//! ```text
//! RespValue ──> Command::parse ──> CommandHandler::execute ──> Reply
//!                (schema/arity)       (keyspace + env ops)
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `ECHO msg`
//! - `SET key value [PX|EX n]`, `GET key`, `DEL key`, `KEYS pattern`
//! - `CONFIG GET name`, `INFO [section]`
//! - `REPLCONF ...`, `PSYNC <id> <offset>` (replica-bootstrap entry points)
//!
//! Anything else is rejected with the `Unknown command` error, before any
//! state is touched.

pub mod command;
pub mod handler;

pub use command::{Command, CommandError, ExpiryUnit, SetExpiry};
pub use handler::{CommandHandler, Reply};
