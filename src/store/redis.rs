use crate::errors::{RateLimitError, Result};
use crate::metrics;
use crate::store::script::{fixed_window_script, load_scripts, token_bucket_script};
use crate::store::Store;
use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::{Script, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// Redis-backed implementation of [`Store`] for distributed deployments
/// where multiple instances share one limit.
///
/// Both primitives run as a single Lua script per call, so the
/// read-compute-write sequence is atomic on the server. Scripts are
/// registered at construction time and invoked by SHA afterwards.
pub struct RedisStore {
    pool: Pool,
    increment_script: Script,
    take_token_script: Script,
}

impl RedisStore {
    /// Create a Redis store over `pool`, registering both Lua scripts up
    /// front.
    pub async fn new(pool: Pool) -> Result<Self> {
        let mut conn = pool.get().await.map_err(|e| {
            RateLimitError::Pool(format!("failed to get connection for script loading: {}", e))
        })?;
        load_scripts(&mut *conn).await?;

        Ok(Self {
            pool,
            increment_script: fixed_window_script(),
            take_token_script: token_bucket_script(),
        })
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool.get().await.map_err(|e| {
            error!("failed to get redis connection: {}", e);
            RateLimitError::Pool(e.to_string())
        })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<i64> {
        let mut conn = self.connection().await?;

        debug!("executing increment script: key={}, window={:?}", key, window);

        let count: i64 = self
            .increment_script
            .key(key)
            .arg(window.as_millis() as i64)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| {
                metrics::record_script_execution("fixed_window", false);
                error!("increment script failed for key '{}': {}", key, e);
                RateLimitError::ScriptExecution(format!("increment script failed: {}", e))
            })?;

        metrics::record_script_execution("fixed_window", true);
        Ok(count)
    }

    async fn take_token(&self, key: &str, rate: f64, burst: i64) -> Result<(bool, f64)> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();

        let mut conn = self.connection().await?;

        debug!(
            "executing take_token script: key={}, rate={}, burst={}",
            key, rate, burst
        );

        let reply: Vec<Value> = self
            .take_token_script
            .key(key)
            .arg(rate)
            .arg(burst)
            .arg(now)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| {
                metrics::record_script_execution("token_bucket", false);
                error!("take_token script failed for key '{}': {}", key, e);
                RateLimitError::ScriptExecution(format!("take_token script failed: {}", e))
            })?;

        metrics::record_script_execution("token_bucket", true);
        parse_take_token_reply(&reply)
    }
}

/// Parse the token-bucket script reply.
///
/// The wire contract is a two-element array of an integer allowed flag and
/// the remaining token count as a decimal string; the string form keeps
/// fractional precision across the wire. Anything else is a protocol
/// fault, never a denial.
fn parse_take_token_reply(reply: &[Value]) -> Result<(bool, f64)> {
    if reply.len() != 2 {
        return Err(RateLimitError::Protocol(format!(
            "expected a two-element reply, got {} elements",
            reply.len()
        )));
    }

    let allowed = match &reply[0] {
        Value::Int(v) => *v == 1,
        other => {
            return Err(RateLimitError::Protocol(format!(
                "expected an integer allowed flag, got {:?}",
                other
            )))
        }
    };

    let tokens = match &reply[1] {
        Value::BulkString(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|e| {
                RateLimitError::Protocol(format!("token count is not valid UTF-8: {}", e))
            })?;
            text.parse::<f64>().map_err(|e| {
                RateLimitError::Protocol(format!("token count '{}' is not a number: {}", text, e))
            })?
        }
        other => {
            return Err(RateLimitError::Protocol(format!(
                "expected a string token count, got {:?}",
                other
            )))
        }
    };

    Ok((allowed, tokens))
}
