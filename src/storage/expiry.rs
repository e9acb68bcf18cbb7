//! Background Expiry Sweeper
//!
//! Lazy expiry alone leaves a hole: a key that expires and is never touched
//! again would sit in memory forever. The sweeper closes it by periodically
//! walking the shards and removing entries whose deadline has passed.
//!
//! The sweep takes each shard's write lock, so it observes the same mutual
//! exclusion as every connection task; it can never race a concurrent read
//! into serving an expired value or evicting a live one.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Default pause between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to the running sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper over `engine`, waking every `interval`.
    pub fn start(engine: Arc<StorageEngine>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(sweep_loop(engine, interval, shutdown_rx));
        info!(interval_ms = interval.as_millis() as u64, "expiry sweeper started");
        Self { shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep_loop(
    engine: Arc<StorageEngine>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("expiry sweeper stopping");
                    return;
                }
            }
        }

        let removed = engine.sweep_expired();
        if removed > 0 {
            debug!(removed, remaining = engine.len(), "swept expired keys");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn sweeper_removes_expired_keys_without_reads() {
        let engine = Arc::new(StorageEngine::new());
        for i in 0..10 {
            engine.set_with_ttl(
                Bytes::from(format!("key{i}")),
                Bytes::from("v"),
                Duration::from_millis(40),
            );
        }
        engine.set(Bytes::from("persistent"), Bytes::from("v"));

        let _sweeper = ExpirySweeper::start(Arc::clone(&engine), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(engine.len(), 1);
        assert_eq!(
            engine.get(&Bytes::from("persistent")),
            Some(Bytes::from("v"))
        );
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_task() {
        let engine = Arc::new(StorageEngine::new());
        {
            let _sweeper = ExpirySweeper::start(Arc::clone(&engine), Duration::from_millis(10));
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        engine.set_with_ttl(
            Bytes::from("k"),
            Bytes::from("v"),
            Duration::from_millis(10),
        );
        tokio::time::sleep(Duration::from_millis(80)).await;

        // No sweeper anymore; only the lazy path notices the deadline.
        assert_eq!(engine.get(&Bytes::from("k")), None);
    }
}
