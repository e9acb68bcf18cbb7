//! Binary Snapshot Parser
//!
//! Parses the persisted keyspace format this server loads at startup:
//! a 5-byte `REDIS` magic, four ASCII version digits, then a stream of
//! single-byte opcodes until an EOF marker or the physical end of the file.
//!
//! ## Opcodes
//!
//! | byte   | meaning                                                      |
//! |--------|--------------------------------------------------------------|
//! | `0xFA` | auxiliary field: string key + string value (metadata)        |
//! | `0xFE` | database selector: one length-encoded integer (metadata)     |
//! | `0xFB` | hash-table size hints: two length-encoded integers (metadata)|
//! | `0x00` | plain record: key + value, no expiry                         |
//! | `0xFC` | ms-precision expiry: 8-byte LE timestamp, type byte, record  |
//! | `0xFD` | s-precision expiry: 4-byte LE timestamp, type byte, record   |
//! | `0xFF` | end of file; trailing checksum bytes are ignored             |
//!
//! Any other opcode stops the parse and keeps what has loaded so far: newer
//! writers may emit sections this reader does not know, and a partial load
//! beats refusing the file. Truncation *inside* a record is different: the
//! file is damaged, and the error propagates.
//!
//! ## Failure Policy
//!
//! A missing file yields an empty snapshot, not an error (a fresh server has
//! nothing to load). A present-but-corrupt file is fatal at startup.

use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

/// The 5-byte file magic.
pub const MAGIC: &[u8] = b"REDIS";

/// Snapshot opcodes.
pub mod opcode {
    pub const AUX: u8 = 0xFA;
    pub const RESIZEDB: u8 = 0xFB;
    pub const EXPIRE_MS: u8 = 0xFC;
    pub const EXPIRE_S: u8 = 0xFD;
    pub const SELECTDB: u8 = 0xFE;
    pub const EOF: u8 = 0xFF;
    /// The only value type this keyspace stores.
    pub const TYPE_STRING: u8 = 0x00;
}

/// Snapshot failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The file does not begin with `REDIS` + four version digits.
    #[error("snapshot does not begin with a REDIS preamble")]
    BadHeader,

    /// The byte stream ended in the middle of a record.
    #[error("snapshot truncated at byte {0}")]
    Truncated(usize),

    /// The file exists but could not be read.
    #[error("failed to read snapshot file: {0}")]
    Io(#[from] std::io::Error),

    /// Writing snapshots is intentionally unimplemented.
    #[error("snapshot writing is not supported")]
    SaveUnsupported,
}

/// One keyspace record from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub key: Bytes,
    pub value: Bytes,
    /// Absolute wall-clock deadline, if the record carried one.
    pub expires_at: Option<SystemTime>,
}

/// Auxiliary fields and size hints collected during the parse.
///
/// Logged for operators, then discarded; nothing here reaches the keyspace.
#[derive(Debug, Default)]
pub struct SnapshotMetadata {
    pub version: String,
    pub aux: HashMap<String, String>,
    pub selected_db: Option<u64>,
    pub table_size_hint: Option<u64>,
    pub expires_size_hint: Option<u64>,
}

/// A fully parsed snapshot.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub entries: Vec<SnapshotEntry>,
    pub metadata: SnapshotMetadata,
}

/// Loads a snapshot from disk. A missing file is an empty snapshot.
pub fn load(path: &Path) -> Result<Snapshot, SnapshotError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no snapshot file, starting empty");
            return Ok(Snapshot::default());
        }
        Err(e) => return Err(SnapshotError::Io(e)),
    };
    parse(&bytes)
}

/// Parses snapshot bytes already in memory (disk load or a full resync).
pub fn parse(buf: &[u8]) -> Result<Snapshot, SnapshotError> {
    if buf.len() < 9 || &buf[..5] != MAGIC {
        return Err(SnapshotError::BadHeader);
    }
    let version = &buf[5..9];
    if !version.iter().all(u8::is_ascii_digit) {
        return Err(SnapshotError::BadHeader);
    }

    let mut snapshot = Snapshot::default();
    snapshot.metadata.version = String::from_utf8_lossy(version).into_owned();

    let mut pos = 9;
    while pos < buf.len() {
        let op = buf[pos];
        pos += 1;

        match op {
            opcode::AUX => {
                let (key, next) = read_string(buf, pos)?;
                let (value, next) = read_string(buf, next)?;
                pos = next;
                snapshot.metadata.aux.insert(
                    String::from_utf8_lossy(&key).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                );
            }
            opcode::SELECTDB => {
                let (db, next) = read_count(buf, pos)?;
                pos = next;
                snapshot.metadata.selected_db = Some(db);
            }
            opcode::RESIZEDB => {
                let (table, next) = read_count(buf, pos)?;
                let (expires, next) = read_count(buf, next)?;
                pos = next;
                snapshot.metadata.table_size_hint = Some(table);
                snapshot.metadata.expires_size_hint = Some(expires);
            }
            opcode::TYPE_STRING => {
                let (entry, next) = read_record(buf, pos, None)?;
                pos = next;
                snapshot.entries.push(entry);
            }
            opcode::EXPIRE_MS => {
                let raw = read_exact::<8>(buf, pos)?;
                let deadline =
                    UNIX_EPOCH + Duration::from_millis(u64::from_le_bytes(raw));
                match read_typed_record(buf, pos + 8, deadline)? {
                    Some((entry, next)) => {
                        pos = next;
                        snapshot.entries.push(entry);
                    }
                    None => break,
                }
            }
            opcode::EXPIRE_S => {
                let raw = read_exact::<4>(buf, pos)?;
                let deadline =
                    UNIX_EPOCH + Duration::from_secs(u64::from(u32::from_le_bytes(raw)));
                match read_typed_record(buf, pos + 4, deadline)? {
                    Some((entry, next)) => {
                        pos = next;
                        snapshot.entries.push(entry);
                    }
                    None => break,
                }
            }
            opcode::EOF => break,
            other => {
                warn!(
                    opcode = %format!("{other:#04x}"),
                    loaded = snapshot.entries.len(),
                    "unsupported snapshot opcode, keeping partial load"
                );
                break;
            }
        }
    }

    debug!(
        version = %snapshot.metadata.version,
        entries = snapshot.entries.len(),
        aux = snapshot.metadata.aux.len(),
        "parsed snapshot"
    );
    Ok(snapshot)
}

/// A decoded length-prefix field.
enum Length {
    /// So many payload bytes follow.
    Len(usize),
    /// The field *was* the value: an inline little-endian integer.
    Int(i64),
    /// Compressed string marker; recognized, not yet supported.
    Compressed,
}

/// Decodes the length encoding shared by every length-prefixed field.
///
/// The top two bits of the first byte select the mode: `00` six-bit length,
/// `01` 14-bit big-endian length, `10` 32-bit big-endian length, `11` a
/// special integer whose low six bits select the width (1/2/4/8 bytes,
/// little-endian) or the compressed-string marker.
fn read_length(buf: &[u8], pos: usize) -> Result<(Length, usize), SnapshotError> {
    let first = *buf.get(pos).ok_or(SnapshotError::Truncated(pos))?;
    match first >> 6 {
        0b00 => Ok((Length::Len((first & 0x3F) as usize), pos + 1)),
        0b01 => {
            let low = *buf.get(pos + 1).ok_or(SnapshotError::Truncated(pos + 1))?;
            let len = (((first & 0x3F) as usize) << 8) | low as usize;
            Ok((Length::Len(len), pos + 2))
        }
        0b10 => {
            let raw = read_exact::<4>(buf, pos + 1)?;
            Ok((Length::Len(u32::from_be_bytes(raw) as usize), pos + 5))
        }
        _ => match first & 0x3F {
            0 => {
                let raw = read_exact::<1>(buf, pos + 1)?;
                Ok((Length::Int(i8::from_le_bytes(raw) as i64), pos + 2))
            }
            1 => {
                let raw = read_exact::<2>(buf, pos + 1)?;
                Ok((Length::Int(i16::from_le_bytes(raw) as i64), pos + 3))
            }
            2 => {
                let raw = read_exact::<4>(buf, pos + 1)?;
                Ok((Length::Int(i32::from_le_bytes(raw) as i64), pos + 5))
            }
            3 => {
                let raw = read_exact::<8>(buf, pos + 1)?;
                Ok((Length::Int(i64::from_le_bytes(raw)), pos + 9))
            }
            _ => Ok((Length::Compressed, pos + 1)),
        },
    }
}

/// Decodes a length-prefixed string, or the inline-integer rendering of one.
fn read_string(buf: &[u8], pos: usize) -> Result<(Bytes, usize), SnapshotError> {
    match read_length(buf, pos)? {
        (Length::Len(len), next) => {
            let end = next + len;
            if buf.len() < end {
                return Err(SnapshotError::Truncated(buf.len()));
            }
            Ok((Bytes::copy_from_slice(&buf[next..end]), end))
        }
        (Length::Int(n), next) => Ok((Bytes::from(n.to_string()), next)),
        (Length::Compressed, next) => {
            warn!("compressed snapshot string not supported, substituting empty");
            Ok((Bytes::new(), next))
        }
    }
}

/// Decodes a length-encoded integer field (db selector, size hints).
fn read_count(buf: &[u8], pos: usize) -> Result<(u64, usize), SnapshotError> {
    match read_length(buf, pos)? {
        (Length::Len(n), next) => Ok((n as u64, next)),
        (Length::Int(n), next) => Ok((n as u64, next)),
        (Length::Compressed, next) => Ok((0, next)),
    }
}

/// Reads a key + value pair into an entry.
fn read_record(
    buf: &[u8],
    pos: usize,
    expires_at: Option<SystemTime>,
) -> Result<(SnapshotEntry, usize), SnapshotError> {
    let (key, next) = read_string(buf, pos)?;
    let (value, next) = read_string(buf, next)?;
    Ok((
        SnapshotEntry {
            key,
            value,
            expires_at,
        },
        next,
    ))
}

/// Reads the value-type byte after an expiry opcode, then the record.
///
/// Only the plain-string type is supported; any other type byte ends the
/// parse with a partial load, the same forward-compatible stance as an
/// unknown opcode.
fn read_typed_record(
    buf: &[u8],
    pos: usize,
    deadline: SystemTime,
) -> Result<Option<(SnapshotEntry, usize)>, SnapshotError> {
    let value_type = *buf.get(pos).ok_or(SnapshotError::Truncated(pos))?;
    if value_type != opcode::TYPE_STRING {
        warn!(
            value_type = %format!("{value_type:#04x}"),
            "unsupported value type after expiry opcode, keeping partial load"
        );
        return Ok(None);
    }
    read_record(buf, pos + 1, Some(deadline)).map(Some)
}

fn read_exact<const N: usize>(buf: &[u8], pos: usize) -> Result<[u8; N], SnapshotError> {
    buf.get(pos..pos + N)
        .ok_or(SnapshotError::Truncated(buf.len()))?
        .try_into()
        .map_err(|_| SnapshotError::Truncated(buf.len()))
}
