use crate::errors::Result;
use crate::limiter::{Decision, Limiter};
use crate::store::Store;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Token bucket rate limiter.
///
/// Allows bursts of up to `burst` requests while sustaining a steady
/// `rate` of tokens per second. Token state is fractional; the integer
/// floor is what callers see in [`Decision::remaining`].
pub struct TokenBucketLimiter<S> {
    store: Arc<S>,
    /// Tokens generated per second. May be fractional.
    rate: f64,
    /// Maximum number of tokens in the bucket.
    burst: i64,
}

impl<S: Store> TokenBucketLimiter<S> {
    /// Create a token bucket limiter over `store`, refilling at `rate`
    /// tokens per second up to a capacity of `burst`.
    pub fn new(store: Arc<S>, rate: f64, burst: i64) -> Self {
        Self { store, rate, burst }
    }
}

#[async_trait]
impl<S: Store + 'static> Limiter for TokenBucketLimiter<S> {
    async fn allow(&self, key: &str) -> Result<Decision> {
        let (allowed, tokens) = self
            .store
            .take_token(key, self.rate, self.burst)
            .await
            .map_err(|e| {
                error!("take_token failed for key '{}': {}", key, e);
                e
            })?;

        let remaining = (tokens.floor() as i64).max(0);
        let reset_after = if allowed {
            Duration::ZERO
        } else {
            // tokens < 1 here; the wait is the time for the bucket to
            // refill back to a whole token at the configured rate.
            Duration::from_secs_f64(((1.0 - tokens) / self.rate).max(0.0))
        };

        debug!(
            "token bucket decision for key '{}': allowed={}, tokens={:.3}, remaining={}",
            key, allowed, tokens, remaining
        );

        Ok(Decision {
            allowed,
            limit: self.burst,
            remaining,
            reset_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RateLimitError;
    use crate::store::MemoryStore;

    struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        async fn increment(&self, _key: &str, _window: Duration) -> Result<i64> {
            Err(RateLimitError::Pool("no connection".to_string()))
        }

        async fn take_token(&self, _key: &str, _rate: f64, _burst: i64) -> Result<(bool, f64)> {
            Err(RateLimitError::Pool("no connection".to_string()))
        }
    }

    #[tokio::test]
    async fn burst_then_sustained_refill() {
        let store = MemoryStore::new(Duration::ZERO);
        let limiter = TokenBucketLimiter::new(store, 1.0, 5);

        let mut remaining = Vec::new();
        for _ in 0..5 {
            let decision = limiter.allow("u1").await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.limit, 5);
            assert_eq!(decision.reset_after, Duration::ZERO);
            remaining.push(decision.remaining);
        }
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let denied = limiter.allow("u1").await.unwrap();
        assert!(!denied.allowed);
        assert!(denied.reset_after >= Duration::from_millis(800));
        assert!(denied.reset_after <= Duration::from_millis(1000));

        // Two seconds refills two whole tokens.
        tokio::time::sleep(Duration::from_secs(2)).await;

        let first = limiter.allow("u1").await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);

        let second = limiter.allow("u1").await.unwrap();
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);
    }

    #[tokio::test]
    async fn fractional_refill_reports_partial_wait() {
        let store = MemoryStore::new(Duration::ZERO);
        let limiter = TokenBucketLimiter::new(store, 2.0, 2);

        assert!(limiter.allow("u1").await.unwrap().allowed);
        assert!(limiter.allow("u1").await.unwrap().allowed);

        tokio::time::sleep(Duration::from_millis(400)).await;

        // Roughly 0.8 tokens refilled; 0.2 short of a whole token at
        // 2 tokens/sec is about a 100ms wait.
        let decision = limiter.allow("u1").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.reset_after >= Duration::from_millis(30));
        assert!(decision.reset_after <= Duration::from_millis(170));
    }

    #[tokio::test]
    async fn limit_is_always_burst() {
        let store = MemoryStore::new(Duration::ZERO);
        let limiter = TokenBucketLimiter::new(store, 0.5, 3);

        for _ in 0..5 {
            let decision = limiter.allow("u1").await.unwrap();
            assert_eq!(decision.limit, 3);
            assert!(decision.remaining >= 0);
            assert!(decision.remaining <= 3);
        }
    }

    #[tokio::test]
    async fn store_errors_propagate() {
        let limiter = TokenBucketLimiter::new(Arc::new(FailingStore), 1.0, 5);

        let err = limiter.allow("u1").await.unwrap_err();
        assert!(matches!(err, RateLimitError::Pool(_)));
    }
}
