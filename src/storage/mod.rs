//! Keyspace Store
//!
//! The concurrent key→value map with expiry that the command dispatcher
//! executes against. A sharded `RwLock<HashMap>` engine carries the data;
//! expiry is enforced twice over: lazily on access, and actively by a
//! background sweeper task.
//!
//! ## Example
//!
//! ```
//! use blazekv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//! engine.set(Bytes::from("name"), Bytes::from("blaze"));
//! assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("blaze")));
//!
//! engine.set_with_ttl(Bytes::from("session"), Bytes::from("tok"), Duration::from_secs(60));
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, StorageEngine, StorageStats};
pub use expiry::{ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
