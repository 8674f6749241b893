use crate::errors::Result;
use crate::metrics;
use crate::store::Store;
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Token-bucket entries untouched for this many cleanup intervals are
/// considered stale and swept.
const STALE_INTERVALS: u32 = 10;

/// Counter and expiry for one fixed-window key.
#[derive(Debug)]
struct FixedWindowEntry {
    count: i64,
    expires_at: Instant,
}

/// Bucket state for one token-bucket key.
#[derive(Debug)]
struct TokenBucketEntry {
    tokens: f64,
    last_updated: Instant,
}

#[derive(Debug, Default)]
struct Entries {
    fixed_window: HashMap<String, FixedWindowEntry>,
    token_bucket: HashMap<String, TokenBucketEntry>,
}

/// In-memory implementation of [`Store`] for single-instance applications.
///
/// Both maps sit behind one mutex: the per-call critical section is a map
/// probe and two arithmetic ops, dwarfed by scheduling overhead. A
/// background reaper sweeps expired window entries and stale buckets every
/// `cleanup_interval`; pass zero to disable it.
///
/// The reaper stops when [`MemoryStore::shutdown`] is called or when the
/// last strong handle to the store is dropped. Bind `shutdown` to process
/// teardown for a clean exit.
pub struct MemoryStore {
    entries: Mutex<Entries>,
    shutdown_tx: watch::Sender<bool>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Create a memory store, spawning the cleanup task when
    /// `cleanup_interval` is non-zero. Must be called from within a tokio
    /// runtime unless cleanup is disabled.
    pub fn new(cleanup_interval: Duration) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let store = Arc::new(Self {
            entries: Mutex::new(Entries::default()),
            shutdown_tx,
            reaper: Mutex::new(None),
        });

        if !cleanup_interval.is_zero() {
            let handle = tokio::spawn(run_reaper(
                Arc::downgrade(&store),
                cleanup_interval,
                shutdown_rx,
            ));
            *store.reaper.lock().unwrap() = Some(handle);
        }

        store
    }

    /// Stop the cleanup task and wait for it to finish. The store remains
    /// usable afterwards; only sweeping stops.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.reaper.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn sweep(&self, stale_threshold: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();

        let windows_before = entries.fixed_window.len();
        entries.fixed_window.retain(|_, e| now <= e.expires_at);
        let windows_removed = windows_before - entries.fixed_window.len();

        let buckets_before = entries.token_bucket.len();
        entries
            .token_bucket
            .retain(|_, e| now.saturating_duration_since(e.last_updated) <= stale_threshold);
        let buckets_removed = buckets_before - entries.token_bucket.len();

        drop(entries);

        metrics::record_reaper_removed("fixed_window", windows_removed as u64);
        metrics::record_reaper_removed("token_bucket", buckets_removed as u64);
        if windows_removed > 0 || buckets_removed > 0 {
            debug!(
                "reaper removed {} window entries and {} bucket entries",
                windows_removed, buckets_removed
            );
        }
    }

    #[cfg(test)]
    fn entry_counts(&self) -> (usize, usize) {
        let entries = self.entries.lock().unwrap();
        (entries.fixed_window.len(), entries.token_bucket.len())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();

        match entries.fixed_window.entry(key.to_string()) {
            Entry::Occupied(mut slot) if now <= slot.get().expires_at => {
                let entry = slot.get_mut();
                entry.count += 1;
                Ok(entry.count)
            }
            // Expired entries are logically absent; replace in place.
            Entry::Occupied(mut slot) => {
                *slot.get_mut() = FixedWindowEntry {
                    count: 1,
                    expires_at: now + window,
                };
                Ok(1)
            }
            Entry::Vacant(slot) => {
                slot.insert(FixedWindowEntry {
                    count: 1,
                    expires_at: now + window,
                });
                Ok(1)
            }
        }
    }

    async fn take_token(&self, key: &str, rate: f64, burst: i64) -> Result<(bool, f64)> {
        let now = Instant::now();
        let burst = burst as f64;
        let mut entries = self.entries.lock().unwrap();

        match entries.token_bucket.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                // The creating request drains one token from a full bucket.
                let remaining = burst - 1.0;
                slot.insert(TokenBucketEntry {
                    tokens: remaining,
                    last_updated: now,
                });
                Ok((true, remaining))
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();

                let elapsed = now.saturating_duration_since(entry.last_updated).as_secs_f64();
                if elapsed > 0.0 {
                    entry.tokens += elapsed * rate;
                }
                if entry.tokens > burst {
                    entry.tokens = burst;
                }
                entry.last_updated = now;

                if entry.tokens >= 1.0 {
                    entry.tokens -= 1.0;
                    Ok((true, entry.tokens))
                } else {
                    Ok((false, entry.tokens))
                }
            }
        }
    }
}

async fn run_reaper(
    store: Weak<MemoryStore>,
    cleanup_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let start = tokio::time::Instant::now() + cleanup_interval;
    let mut ticker = tokio::time::interval_at(start, cleanup_interval);
    let stale_threshold = cleanup_interval * STALE_INTERVALS;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.sweep(stale_threshold);
            }
            _ = shutdown_rx.changed() => {
                break;
            }
        }
    }

    debug!("memory store reaper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increment_counts_up_within_window() {
        let store = MemoryStore::new(Duration::ZERO);
        let window = Duration::from_secs(60);

        assert_eq!(store.increment("u1", window).await.unwrap(), 1);
        assert_eq!(store.increment("u1", window).await.unwrap(), 2);
        assert_eq!(store.increment("u1", window).await.unwrap(), 3);
        assert_eq!(store.increment("u2", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn increment_restarts_after_expiry() {
        let store = MemoryStore::new(Duration::ZERO);
        let window = Duration::from_millis(50);

        assert_eq!(store.increment("u1", window).await.unwrap(), 1);
        assert_eq!(store.increment("u1", window).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(store.increment("u1", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn take_token_drains_a_full_bucket() {
        let store = MemoryStore::new(Duration::ZERO);

        let (allowed, remaining) = store.take_token("u1", 0.1, 5).await.unwrap();
        assert!(allowed);
        assert!((remaining - 4.0).abs() < 0.01);

        for _ in 0..4 {
            let (allowed, _) = store.take_token("u1", 0.1, 5).await.unwrap();
            assert!(allowed);
        }

        let (allowed, remaining) = store.take_token("u1", 0.1, 5).await.unwrap();
        assert!(!allowed);
        assert!(remaining < 1.0);
    }

    #[tokio::test]
    async fn refill_is_clamped_to_burst() {
        let store = MemoryStore::new(Duration::ZERO);

        let _ = store.take_token("u1", 1000.0, 2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // 50ms at 1000 tokens/sec would overfill many times over.
        let (allowed, remaining) = store.take_token("u1", 1000.0, 2).await.unwrap();
        assert!(allowed);
        assert!(remaining <= 2.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_increments_serialize_per_key() {
        let store = MemoryStore::new(Duration::ZERO);
        let window = Duration::from_secs(60);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.increment("shared", window).await.unwrap()
            }));
        }

        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await.unwrap());
        }
        counts.sort_unstable();

        assert_eq!(counts, (1..=20).collect::<Vec<i64>>());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_take_token_has_single_winner() {
        let store = MemoryStore::new(Duration::ZERO);

        // Creation consumes one token, leaving one in a bucket of two.
        let _ = store.take_token("shared", 0.1, 2).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.take_token("shared", 0.1, 2).await.unwrap().0
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }

        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn reaper_sweeps_expired_window_entries() {
        let store = MemoryStore::new(Duration::from_millis(100));

        store
            .increment("u1", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(store.entry_counts().0, 1);

        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(store.entry_counts().0, 0);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn reaper_sweeps_stale_buckets() {
        let store = MemoryStore::new(Duration::from_millis(20));

        store.take_token("u1", 1.0, 5).await.unwrap();
        assert_eq!(store.entry_counts().1, 1);

        // Stale after 10 intervals (200ms); give the ticker a few extra
        // rounds to observe it.
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(store.entry_counts().1, 0);
        store.shutdown().await;
    }

    #[tokio::test]
    async fn disabled_reaper_leaves_expired_entries_in_place() {
        let store = MemoryStore::new(Duration::ZERO);
        let window = Duration::from_millis(20);

        store.increment("u1", window).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        // Still physically present, but logically absent to increment.
        assert_eq!(store.entry_counts().0, 1);
        assert_eq!(store.increment("u1", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_reaper_and_store_stays_usable() {
        let store = MemoryStore::new(Duration::from_millis(100));

        let shut = tokio::time::timeout(Duration::from_secs(1), store.shutdown()).await;
        assert!(shut.is_ok());

        assert_eq!(
            store.increment("u1", Duration::from_secs(60)).await.unwrap(),
            1
        );
        let (allowed, _) = store.take_token("u1", 1.0, 5).await.unwrap();
        assert!(allowed);
    }
}
