use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimitError {
    /// Sentinel passed to the configured error handler when a request is
    /// denied, so user code can branch without string matching. Never
    /// returned by stores or limiters; a denial is normal data there.
    #[error("rate limit exceeded")]
    Exceeded,

    #[error("key extraction failed: {0}")]
    KeyExtraction(String),

    #[error("redis connection error: {0}")]
    RedisConnection(#[from] redis::RedisError),

    #[error("redis pool error: {0}")]
    Pool(String),

    #[error("script execution error: {0}")]
    ScriptExecution(String),

    /// The remote store answered, but the reply did not match the wire
    /// contract. Kept separate from `Exceeded`: a protocol fault must not
    /// read as a denial.
    #[error("malformed store reply: {0}")]
    Protocol(String),
}

impl RateLimitError {
    /// Stable label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            RateLimitError::Exceeded => "exceeded",
            RateLimitError::KeyExtraction(_) => "key_extraction",
            RateLimitError::RedisConnection(_) => "redis_connection",
            RateLimitError::Pool(_) => "pool",
            RateLimitError::ScriptExecution(_) => "script_execution",
            RateLimitError::Protocol(_) => "protocol",
        }
    }

    pub fn is_exceeded(&self) -> bool {
        matches!(self, RateLimitError::Exceeded)
    }
}

/// Result type alias for rate limiter operations
pub type Result<T> = std::result::Result<T, RateLimitError>;
