//! Transport-agnostic rate limiting with pluggable storage backends.
//!
//! Two admission algorithms decide, per client key, whether a request may
//! proceed right now and how long to wait otherwise: fixed window counting
//! and token bucket with fractional refill. Per-key state lives behind the
//! [`Store`] seam, either in-process ([`MemoryStore`]) or shared across
//! instances via Redis ([`RedisStore`]). The [`middleware`] module turns
//! decisions into `X-RateLimit-*` headers for tower/axum services.

pub mod errors;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod store;

// Re-export commonly used types
pub use errors::{RateLimitError, Result};
pub use limiter::{Decision, FixedWindowLimiter, Limiter, TokenBucketLimiter};
pub use middleware::{Logger, MiddlewareConfig, NoopLogger, RateLimitLayer, TracingLogger};
pub use store::{MemoryStore, RedisStore, Store};
