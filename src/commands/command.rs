//! Command Frames
//!
//! The closed set of commands this server executes, parsed out of a decoded
//! wire frame before any handler runs. Each variant declares its argument
//! schema; [`Command::parse`] performs the frame-shape and arity validation
//! in one place, so handlers never index into unchecked positional arguments.
//!
//! Command names match exactly and case-sensitively (`SET` dispatches, `set`
//! does not). The one case-insensitive comparison in the grammar is SET's
//! expiry option token (`PX`/`px`).

use crate::protocol::RespValue;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Rejection of a frame before execution. The message text is the exact
/// SimpleError payload sent back to the client.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    /// The frame is not a non-empty array of strings.
    #[error("ERR invalid command frame")]
    InvalidFrame,

    /// Declared arity not met.
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    /// A numeric argument did not parse.
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    /// Name outside the supported set.
    #[error("Unknown command")]
    Unknown,
}

/// Unit of SET's expiry option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryUnit {
    Seconds,
    Millis,
}

/// SET's parsed `[PX|EX n]` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetExpiry {
    pub amount: i64,
    pub unit: ExpiryUnit,
}

impl SetExpiry {
    /// Time-to-live as a duration. Caller guarantees `amount > 0`.
    pub fn to_duration(self) -> Duration {
        match self.unit {
            ExpiryUnit::Seconds => Duration::from_secs(self.amount as u64),
            ExpiryUnit::Millis => Duration::from_millis(self.amount as u64),
        }
    }
}

/// A validated command, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Echo(Bytes),
    Set {
        key: Bytes,
        value: Bytes,
        expiry: Option<SetExpiry>,
    },
    Get(Bytes),
    Del(Bytes),
    Keys(String),
    ConfigGet(String),
    Info(Option<String>),
    Replconf,
    Psync,
}

impl Command {
    /// Validates a decoded frame into a command.
    ///
    /// The frame must be a non-empty array; the first element names the
    /// command and the rest are its arguments. Arity failures surface here,
    /// before any state is touched.
    pub fn parse(frame: RespValue) -> Result<Command, CommandError> {
        let RespValue::Array(items) = frame else {
            return Err(CommandError::InvalidFrame);
        };
        let Some((name_item, args)) = items.split_first() else {
            return Err(CommandError::InvalidFrame);
        };
        let name = name_item.as_str().ok_or(CommandError::InvalidFrame)?;

        match name {
            "PING" => expect_arity(args, 0, "PING").map(|_| Command::Ping),
            "ECHO" => {
                expect_arity(args, 1, "ECHO")?;
                Ok(Command::Echo(arg_bytes(&args[0])?))
            }
            "SET" => parse_set(args),
            "GET" => {
                expect_arity(args, 1, "GET")?;
                Ok(Command::Get(arg_bytes(&args[0])?))
            }
            "DEL" => {
                expect_arity(args, 1, "DEL")?;
                Ok(Command::Del(arg_bytes(&args[0])?))
            }
            "KEYS" => {
                // Absent pattern matches everything.
                let pattern = match args {
                    [] => String::new(),
                    [pattern] => arg_text(pattern)?,
                    _ => return Err(CommandError::WrongArity("KEYS")),
                };
                Ok(Command::Keys(pattern))
            }
            "CONFIG" => {
                expect_arity(args, 2, "CONFIG")?;
                if arg_text(&args[0])? != "GET" {
                    return Err(CommandError::Unknown);
                }
                Ok(Command::ConfigGet(arg_text(&args[1])?))
            }
            "INFO" => match args {
                [] => Ok(Command::Info(None)),
                [section] => Ok(Command::Info(Some(arg_text(section)?))),
                _ => Err(CommandError::WrongArity("INFO")),
            },
            // Replica-bootstrap entry points; every argument form is accepted.
            "REPLCONF" => Ok(Command::Replconf),
            "PSYNC" => expect_arity(args, 2, "PSYNC").map(|_| Command::Psync),
            _ => Err(CommandError::Unknown),
        }
    }
}

/// `SET key value [PX|EX n]`.
fn parse_set(args: &[RespValue]) -> Result<Command, CommandError> {
    match args {
        [key, value] => Ok(Command::Set {
            key: arg_bytes(key)?,
            value: arg_bytes(value)?,
            expiry: None,
        }),
        [key, value, token, amount] => {
            let unit = if arg_text(token)?.eq_ignore_ascii_case("px") {
                ExpiryUnit::Millis
            } else {
                ExpiryUnit::Seconds
            };
            Ok(Command::Set {
                key: arg_bytes(key)?,
                value: arg_bytes(value)?,
                expiry: Some(SetExpiry {
                    amount: arg_int(amount)?,
                    unit,
                }),
            })
        }
        _ => Err(CommandError::WrongArity("SET")),
    }
}

fn expect_arity(
    args: &[RespValue],
    expected: usize,
    name: &'static str,
) -> Result<(), CommandError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(CommandError::WrongArity(name))
    }
}

fn arg_bytes(value: &RespValue) -> Result<Bytes, CommandError> {
    match value {
        RespValue::BulkString(b) => Ok(b.clone()),
        RespValue::SimpleString(s) => Ok(Bytes::copy_from_slice(s.as_bytes())),
        _ => Err(CommandError::InvalidFrame),
    }
}

fn arg_text(value: &RespValue) -> Result<String, CommandError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or(CommandError::InvalidFrame)
}

fn arg_int(value: &RespValue) -> Result<i64, CommandError> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)
}
