use crate::errors::Result;
use crate::limiter::{Decision, Limiter};
use crate::store::Store;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// Fixed window rate limiter.
///
/// Admits at most `limit` requests per key within a tumbling interval of
/// length `window`. Simple and memory-cheap, at the cost of permitting
/// bursts across window edges.
///
/// The reported `reset_after` is measured to the window boundary aligned to
/// the Unix-epoch grid, shared by every caller in that window. The store's
/// per-entry expiry is relative to the first request instead; the two can
/// disagree by up to one window. The limiter-reported value is the one
/// clients observe.
pub struct FixedWindowLimiter<S> {
    store: Arc<S>,
    limit: i64,
    window: Duration,
}

impl<S: Store> FixedWindowLimiter<S> {
    /// Create a fixed window limiter over `store`, admitting `limit`
    /// requests per `window`.
    pub fn new(store: Arc<S>, limit: i64, window: Duration) -> Self {
        Self {
            store,
            limit,
            window,
        }
    }
}

#[async_trait]
impl<S: Store + 'static> Limiter for FixedWindowLimiter<S> {
    async fn allow(&self, key: &str) -> Result<Decision> {
        let count = self.store.increment(key, self.window).await.map_err(|e| {
            error!("increment failed for key '{}': {}", key, e);
            e
        })?;

        let allowed = count <= self.limit;
        let remaining = (self.limit - count).max(0);
        let reset_after = if allowed {
            Duration::ZERO
        } else {
            aligned_window_reset(self.window)
        };

        debug!(
            "fixed window decision for key '{}': allowed={}, count={}, remaining={}",
            key, allowed, count, remaining
        );

        Ok(Decision {
            allowed,
            limit: self.limit,
            remaining,
            reset_after,
        })
    }
}

/// Time left until the window boundary aligned to the Unix-epoch grid.
fn aligned_window_reset(window: Duration) -> Duration {
    let window_nanos = window.as_nanos();
    if window_nanos == 0 {
        return Duration::ZERO;
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let into_window = now.as_nanos() % window_nanos;
    Duration::from_nanos((window_nanos - into_window) as u64)
}
