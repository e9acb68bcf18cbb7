//! Concurrent Keyspace with Expiry
//!
//! The shared key→value map every connection task operates on. String values
//! only; the snapshot format this server loads carries no other value type.
//!
//! ## Concurrency Model
//!
//! The map is split into a fixed number of shards, each guarded by its own
//! `RwLock`. A key hashes to exactly one shard, so operations on different
//! keys mostly proceed in parallel while every compound operation on a single
//! key runs as one critical section under its shard's lock.
//!
//! ## Expiry Invariants
//!
//! An entry whose deadline has passed is logically absent:
//!
//! - a read never observes an expired value: `get` checks the deadline and
//!   evicts under the shard's write lock, in one atomic step;
//! - eviction never happens early: the background sweeper and the lazy path
//!   both compare against `Instant::now()` before removing anything.

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime};

/// Shard count. A compromise between lock contention and per-shard overhead.
const NUM_SHARDS: usize = 16;

/// One stored value with its optional expiry deadline.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Bytes,
    /// Absolute deadline; `None` means the entry never expires.
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn with_ttl(value: Bytes, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Some(Instant::now() + ttl),
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

#[derive(Debug)]
struct Shard {
    entries: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

/// The shared keyspace.
///
/// Wrapped in an `Arc` and handed to every connection task, the sweeper, and
/// the snapshot loader. All operations are thread-safe.
pub struct StorageEngine {
    shards: Vec<Shard>,
    key_count: AtomicU64,
    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::new()).collect(),
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard_for(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Unconditional overwrite with no expiry. Always succeeds.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.insert_entry(key, Entry::new(value));
    }

    /// Unconditional overwrite with a time-to-live.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) {
        self.insert_entry(key, Entry::with_ttl(value, ttl));
    }

    fn insert_entry(&self, key: Bytes, entry: Entry) {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        let shard = self.shard_for(&key);
        let mut entries = shard.entries.write().unwrap();
        if entries.insert(key, entry).is_none() {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Looks up a key, evicting it first if its deadline has passed.
    ///
    /// Runs under the shard's write lock so the expiry check, the eviction,
    /// and the return are one atomic step: no reader can observe an expired
    /// value, and no concurrent overwrite can be evicted by a stale check.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.shard_for(key);
        let mut entries = shard.entries.write().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Removes a key if present. Absence is not an error.
    pub fn delete(&self, key: &Bytes) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        let shard = self.shard_for(key);
        let mut entries = shard.entries.write().unwrap();
        if entries.remove(key).is_some() {
            self.key_count.fetch_sub(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Returns every live key matched by `pattern`.
    ///
    /// `*` matches any run of characters, and the match is deliberately
    /// unanchored: the pattern may land anywhere inside the key, so `foo`
    /// matches `xfooy`. An empty pattern matches every key. Expired keys are
    /// excluded even if they were never read.
    pub fn keys(&self, pattern: &str) -> Vec<Bytes> {
        let mut matched = Vec::new();
        for shard in &self.shards {
            let entries = shard.entries.read().unwrap();
            for (key, entry) in entries.iter() {
                if entry.is_expired() {
                    continue;
                }
                if let Ok(key_str) = std::str::from_utf8(key) {
                    if pattern_matches(pattern, key_str) {
                        matched.push(key.clone());
                    }
                }
            }
        }
        matched
    }

    /// One-time bulk seed from the snapshot loader.
    ///
    /// Entries carry absolute wall-clock deadlines; anything already past its
    /// deadline is logically absent and never enters the map. Returns the
    /// count of loaded entries and the count dropped as already expired.
    pub fn bulk_load(
        &self,
        entries: impl IntoIterator<Item = (Bytes, Bytes, Option<SystemTime>)>,
    ) -> (usize, usize) {
        let now = SystemTime::now();
        let mut loaded = 0;
        let mut dropped = 0;
        for (key, value, deadline) in entries {
            match deadline {
                None => {
                    self.set(key, value);
                    loaded += 1;
                }
                Some(at) => match at.duration_since(now) {
                    Ok(remaining) => {
                        self.set_with_ttl(key, value, remaining);
                        loaded += 1;
                    }
                    // Deadline is already in the past.
                    Err(_) => dropped += 1,
                },
            }
        }
        (loaded, dropped)
    }

    /// Removes every entry whose deadline has passed. Called by the sweeper.
    pub fn sweep_expired(&self) -> u64 {
        let mut removed = 0u64;
        for shard in &self.shards {
            let mut entries = shard.entries.write().unwrap();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired());
            removed += (before - entries.len()) as u64;
        }
        if removed > 0 {
            self.key_count.fetch_sub(removed, Ordering::Relaxed);
            self.expired_count.fetch_add(removed, Ordering::Relaxed);
        }
        removed
    }

    /// Approximate live key count.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Operation counters, for lifecycle logging.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Keyspace operation counters.
#[derive(Debug, Clone, Copy)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    pub expired: u64,
}

/// Unanchored `*`-glob match.
///
/// The pattern splits into literal segments around `*`; the key matches when
/// the segments occur in order anywhere inside it. Neither end is pinned.
fn pattern_matches(pattern: &str, key: &str) -> bool {
    let mut pos = 0;
    for segment in pattern.split('*').filter(|s| !s.is_empty()) {
        match key[pos..].find(segment) {
            Some(found) => pos += found + segment.len(),
            None => return false,
        }
    }
    true
}
