pub mod memory;
pub mod pool;
pub mod redis;
pub mod script;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use crate::errors::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Storage backend for rate-limiting state.
///
/// A store provides the two atomic primitives the limiters consume. Both
/// must be linearizable per key: the read-compute-write sequence for one
/// key completes without interleaving with concurrent callers. Calls on
/// different keys need no ordering guarantee.
///
/// Cancellation follows Rust future semantics: dropping a pending call
/// abandons the remote round-trip, while the in-memory critical section is
/// synchronous and always runs to completion once entered.
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically increment the fixed-window counter for `key`, creating a
    /// fresh entry with count 1 and an expiry of `now + window` when no
    /// live entry exists. Returns the post-increment count. The expiry of
    /// an existing entry is never refreshed; the window is fixed, not
    /// sliding.
    async fn increment(&self, key: &str, window: Duration) -> Result<i64>;

    /// Atomically refill the token bucket for `key` at `rate` tokens per
    /// second up to `burst`, then consume one token if at least one is
    /// available. Returns whether a token was taken and the fractional
    /// count left in the bucket.
    async fn take_token(&self, key: &str, rate: f64, burst: i64) -> Result<(bool, f64)>;
}
