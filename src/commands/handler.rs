//! Command Execution
//!
//! Maps a validated [`Command`] to an operation against the keyspace and the
//! environment, producing the reply value(s) to serialize back to the client.
//!
//! Most commands reply with a single frame. `PSYNC` is the exception: its
//! reply is two buffers, the `FULLRESYNC` line and the raw snapshot payload,
//! which [`Reply`] keeps distinct so the connection layer writes them in
//! order with the right framing.

use crate::commands::command::Command;
use crate::config::Environment;
use crate::protocol::{serialize_snapshot_payload, RespValue};
use crate::snapshot;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// The outcome of executing one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// An ordinary single-frame reply.
    Value(RespValue),
    /// PSYNC's two-part reply: the header frame, then the snapshot bytes
    /// length-prefixed with no trailing terminator.
    FullResync {
        header: RespValue,
        snapshot: Bytes,
    },
}

impl Reply {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Reply::Value(value) => value.serialize_into(&mut buf),
            Reply::FullResync { header, snapshot } => {
                header.serialize_into(&mut buf);
                serialize_snapshot_payload(snapshot, &mut buf);
            }
        }
        buf
    }
}

/// Executes commands against the shared keyspace and environment.
///
/// Stateless apart from its two `Arc` handles; cheap to clone per connection.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    env: Arc<Environment>,
}

impl CommandHandler {
    pub fn new(storage: Arc<StorageEngine>, env: Arc<Environment>) -> Self {
        Self { storage, env }
    }

    /// Validates and executes a decoded frame.
    ///
    /// Validation failures (arity, unknown name, bad frame shape) become a
    /// SimpleError reply; the connection stays open.
    pub fn handle_frame(&self, frame: RespValue) -> Reply {
        match Command::parse(frame) {
            Ok(command) => self.execute(command),
            Err(e) => {
                debug!(error = %e, "rejected command frame");
                Reply::Value(RespValue::error(e.to_string()))
            }
        }
    }

    /// Executes a validated command.
    pub fn execute(&self, command: Command) -> Reply {
        match command {
            Command::Ping => Reply::Value(RespValue::simple_string("PONG")),

            Command::Echo(msg) => Reply::Value(RespValue::bulk_string(msg)),

            Command::Set { key, value, expiry } => {
                match expiry {
                    // A non-positive amount means no expiry at all.
                    Some(e) if e.amount > 0 => {
                        self.storage.set_with_ttl(key, value, e.to_duration())
                    }
                    _ => self.storage.set(key, value),
                }
                Reply::Value(RespValue::ok())
            }

            Command::Get(key) => Reply::Value(match self.storage.get(&key) {
                Some(value) => RespValue::bulk_string(value),
                None => RespValue::null(),
            }),

            // Replies the literal OK whether or not the key existed; the
            // observed contract, not the count-returning reference one.
            Command::Del(key) => {
                self.storage.delete(&key);
                Reply::Value(RespValue::ok())
            }

            Command::Keys(pattern) => {
                let keys = self
                    .storage
                    .keys(&pattern)
                    .into_iter()
                    .map(RespValue::bulk_string)
                    .collect();
                Reply::Value(RespValue::array(keys))
            }

            Command::ConfigGet(name) => {
                let value = match self.env.config_get(&name) {
                    Some(v) => RespValue::bulk_string(Bytes::copy_from_slice(v.as_bytes())),
                    None => RespValue::null(),
                };
                Reply::Value(RespValue::array(vec![
                    RespValue::bulk_string(Bytes::from(name)),
                    value,
                ]))
            }

            Command::Info(section) => {
                let body = match section.as_deref() {
                    None | Some("replication") => self.env.replication_info(),
                    Some(_) => String::new(),
                };
                Reply::Value(RespValue::bulk_string(Bytes::from(body)))
            }

            Command::Replconf => Reply::Value(RespValue::ok()),

            Command::Psync => {
                let header =
                    RespValue::simple_string(format!("FULLRESYNC {} 0", self.env.replid));
                debug!("serving full resync");
                Reply::FullResync {
                    header,
                    snapshot: snapshot::empty_snapshot(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::time::Duration;

    fn handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        let env = Arc::new(Environment::new(&ServerConfig::default()));
        CommandHandler::new(storage, env)
    }

    fn run(handler: &CommandHandler, parts: &[&str]) -> Reply {
        handler.handle_frame(RespValue::command(parts))
    }

    fn expect_value(reply: Reply) -> RespValue {
        match reply {
            Reply::Value(value) => value,
            other => panic!("expected single-frame reply, got {other:?}"),
        }
    }

    #[test]
    fn ping_pongs() {
        let h = handler();
        assert_eq!(
            expect_value(run(&h, &["PING"])),
            RespValue::simple_string("PONG")
        );
    }

    #[test]
    fn echo_returns_its_argument_as_bulk() {
        let h = handler();
        assert_eq!(
            expect_value(run(&h, &["ECHO", "hello"])),
            RespValue::bulk_string(Bytes::from("hello"))
        );
    }

    #[test]
    fn set_then_get_round_trips() {
        let h = handler();
        assert_eq!(expect_value(run(&h, &["SET", "k", "v"])), RespValue::ok());
        assert_eq!(
            expect_value(run(&h, &["GET", "k"])),
            RespValue::bulk_string(Bytes::from("v"))
        );
    }

    #[test]
    fn get_missing_is_null() {
        let h = handler();
        assert_eq!(expect_value(run(&h, &["GET", "nope"])), RespValue::null());
    }

    #[test]
    fn set_px_expires_in_milliseconds() {
        let h = handler();
        run(&h, &["SET", "k", "v", "PX", "100"]);
        assert_eq!(
            expect_value(run(&h, &["GET", "k"])),
            RespValue::bulk_string(Bytes::from("v"))
        );

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(expect_value(run(&h, &["GET", "k"])), RespValue::null());

        // Expired keys drop out of KEYS without ever being read again.
        assert_eq!(
            expect_value(run(&h, &["KEYS", "*"])),
            RespValue::array(vec![])
        );
    }

    #[test]
    fn set_with_non_positive_expiry_never_expires() {
        let h = handler();
        run(&h, &["SET", "k", "v", "PX", "-1"]);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(
            expect_value(run(&h, &["GET", "k"])),
            RespValue::bulk_string(Bytes::from("v"))
        );
    }

    #[test]
    fn del_replies_the_literal_ok() {
        let h = handler();
        run(&h, &["SET", "k", "v"]);
        assert_eq!(expect_value(run(&h, &["DEL", "k"])), RespValue::ok());
        assert_eq!(expect_value(run(&h, &["GET", "k"])), RespValue::null());
        // Deleting an absent key is not an error either.
        assert_eq!(expect_value(run(&h, &["DEL", "k"])), RespValue::ok());
    }

    #[test]
    fn keys_returns_matches_as_bulk_array() {
        let h = handler();
        run(&h, &["SET", "user:1", "a"]);
        run(&h, &["SET", "user:2", "b"]);
        run(&h, &["SET", "other", "c"]);

        let RespValue::Array(items) = expect_value(run(&h, &["KEYS", "user:*"])) else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn config_get_returns_name_value_pair() {
        let h = handler();
        assert_eq!(
            expect_value(run(&h, &["CONFIG", "GET", "dir"])),
            RespValue::array(vec![
                RespValue::bulk_string(Bytes::from("dir")),
                RespValue::bulk_string(Bytes::from(".")),
            ])
        );
        assert_eq!(
            expect_value(run(&h, &["CONFIG", "GET", "dbfilename"])),
            RespValue::array(vec![
                RespValue::bulk_string(Bytes::from("dbfilename")),
                RespValue::bulk_string(Bytes::from("dump.rdb")),
            ])
        );
        // Unrecognized names pair with a null value.
        assert_eq!(
            expect_value(run(&h, &["CONFIG", "GET", "maxmemory"])),
            RespValue::array(vec![
                RespValue::bulk_string(Bytes::from("maxmemory")),
                RespValue::null(),
            ])
        );
    }

    #[test]
    fn info_replication_reports_role_and_offsets() {
        let h = handler();
        let value = expect_value(run(&h, &["INFO", "replication"]));
        let text = String::from_utf8(value.as_bytes().unwrap().to_vec()).unwrap();
        assert!(text.starts_with("role:master\n"));
        assert!(text.contains("master_replid:"));
        assert!(text.contains("master_repl_offset:0"));
    }

    #[test]
    fn replconf_always_acknowledges() {
        let h = handler();
        assert_eq!(
            expect_value(run(&h, &["REPLCONF", "listening-port", "6380"])),
            RespValue::ok()
        );
        assert_eq!(
            expect_value(run(&h, &["REPLCONF", "capa", "eof"])),
            RespValue::ok()
        );
    }

    #[test]
    fn psync_replies_header_then_snapshot() {
        let h = handler();
        let Reply::FullResync { header, snapshot } = run(&h, &["PSYNC", "?", "-1"]) else {
            panic!("expected full resync reply");
        };

        let RespValue::SimpleString(line) = header else {
            panic!("expected simple string header");
        };
        assert!(line.starts_with("FULLRESYNC "));
        assert!(line.ends_with(" 0"));
        assert!(!snapshot.is_empty());
    }

    #[test]
    fn psync_serialization_declares_the_exact_payload_length() {
        let h = handler();
        let reply = run(&h, &["PSYNC", "?", "-1"]);
        let bytes = reply.serialize();

        // The header line, then `$<len>\r\n` immediately followed by exactly
        // <len> payload bytes and nothing after them.
        let header_end = bytes.windows(2).position(|w| w == b"\r\n").unwrap() + 2;
        assert_eq!(bytes[header_end], b'$');
        let len_end = header_end
            + bytes[header_end..]
                .windows(2)
                .position(|w| w == b"\r\n")
                .unwrap();
        let declared: usize = std::str::from_utf8(&bytes[header_end + 1..len_end])
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(bytes.len() - (len_end + 2), declared);
    }

    #[test]
    fn unknown_command_errors_and_leaves_keyspace_untouched() {
        let storage = Arc::new(StorageEngine::new());
        let env = Arc::new(Environment::new(&ServerConfig::default()));
        let h = CommandHandler::new(Arc::clone(&storage), env);

        run(&h, &["SET", "k", "v"]);
        let before = storage.len();

        assert_eq!(
            expect_value(run(&h, &["FOOBAR"])),
            RespValue::error("Unknown command")
        );
        assert_eq!(storage.len(), before);
    }

    #[test]
    fn arity_failures_reply_as_simple_errors() {
        let h = handler();
        let value = expect_value(run(&h, &["GET"]));
        assert!(value.is_error());
        assert_eq!(
            value,
            RespValue::error("ERR wrong number of arguments for 'GET' command")
        );
    }
}
