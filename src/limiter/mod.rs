pub mod fixed_window;
pub mod token_bucket;

pub use fixed_window::FixedWindowLimiter;
pub use token_bucket::TokenBucketLimiter;

use crate::errors::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Outcome of a rate limit check.
///
/// Carries everything needed to populate the standard `X-RateLimit-*`
/// response headers.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the request is permitted.
    pub allowed: bool,

    /// Maximum admissible requests in the current regime (the window
    /// capacity, or the bucket burst).
    pub limit: i64,

    /// Requests left, clamped to `[0, limit]`.
    pub remaining: i64,

    /// Time until the next request becomes admissible. Zero whenever
    /// `allowed` is true.
    pub reset_after: Duration,
}

/// Trait for rate-limiting algorithms.
///
/// This is the single entry point middleware and users interact with.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// Check whether a request is permitted for the given key.
    async fn allow(&self, key: &str) -> Result<Decision>;
}
