//! Snapshot Writer (intentionally stubbed)
//!
//! Durable snapshot writing is out of scope for this server: [`save`] exists
//! so the call site reads naturally, and fails with
//! [`SnapshotError::SaveUnsupported`] if anything invokes it.
//!
//! What the server *does* need to emit is the payload of a full resync: the
//! bytes a master ships to a bootstrapping replica after `FULLRESYNC`.
//! [`empty_snapshot`] builds the minimal well-formed file for that purpose:
//! header, two auxiliary fields, the EOF marker, and a placeholder checksum
//! (all zeroes, the convention for "checksum not computed").

use crate::snapshot::reader::{opcode, SnapshotError, MAGIC};
use bytes::Bytes;
use std::path::Path;

/// Snapshot persistence is not supported; always fails.
pub fn save(_path: &Path) -> Result<(), SnapshotError> {
    Err(SnapshotError::SaveUnsupported)
}

/// Builds the empty snapshot served to replicas during a full resync.
pub fn empty_snapshot() -> Bytes {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(b"0011");

    write_aux(&mut buf, "redis-ver", "7.2.0");
    write_aux(&mut buf, "redis-bits", "64");

    buf.push(opcode::EOF);
    buf.extend_from_slice(&[0u8; 8]);
    Bytes::from(buf)
}

fn write_aux(buf: &mut Vec<u8>, key: &str, value: &str) {
    buf.push(opcode::AUX);
    write_string(buf, key);
    write_string(buf, value);
}

/// Six-bit length prefix; all fields emitted here are short.
fn write_string(buf: &mut Vec<u8>, s: &str) {
    debug_assert!(s.len() < 64);
    buf.push(s.len() as u8);
    buf.extend_from_slice(s.as_bytes());
}
