//! Persisted Snapshot Format
//!
//! The binary on-disk representation of the keyspace. The reader seeds the
//! keyspace once at startup (and parses the payload of a full resync); the
//! writer is an intentional stub, apart from the canned empty snapshot a
//! master serves to bootstrapping replicas.
//!
//! ## Modules
//!
//! - `reader`: opcode-stream parser, grammar in its module docs
//! - `writer`: unsupported `save` + the empty full-resync payload

pub mod reader;
pub mod writer;

pub use reader::{load, parse, Snapshot, SnapshotEntry, SnapshotError, SnapshotMetadata};
pub use writer::empty_snapshot;
