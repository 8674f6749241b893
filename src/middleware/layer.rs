use crate::errors::RateLimitError;
use crate::limiter::{Decision, Limiter};
use crate::metrics;
use crate::middleware::MiddlewareConfig;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};
use tower_layer::Layer;
use tower_service::Service;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Tower layer that enforces a rate limit in front of a service.
///
/// Every response carries the three `X-RateLimit-*` headers; denied
/// requests go through the configured error handler instead of the inner
/// service.
pub struct RateLimitLayer<L> {
    limiter: Arc<L>,
    config: Arc<MiddlewareConfig>,
}

impl<L> RateLimitLayer<L> {
    /// Create a layer with the default configuration.
    pub fn new(limiter: Arc<L>) -> Self {
        Self::with_config(limiter, MiddlewareConfig::default())
    }

    /// Create a layer with custom key extraction, error handling, or
    /// logging.
    pub fn with_config(limiter: Arc<L>, config: MiddlewareConfig) -> Self {
        Self {
            limiter,
            config: Arc::new(config),
        }
    }
}

impl<L> Clone for RateLimitLayer<L> {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, L> Layer<S> for RateLimitLayer<L> {
    type Service = RateLimitService<S, L>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: Arc::clone(&self.limiter),
            config: Arc::clone(&self.config),
        }
    }
}

/// Middleware service produced by [`RateLimitLayer`].
pub struct RateLimitService<S, L> {
    inner: S,
    limiter: Arc<L>,
    config: Arc<MiddlewareConfig>,
}

impl<S: Clone, L> Clone for RateLimitService<S, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S, L> Service<Request<Body>> for RateLimitService<S, L>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    L: Limiter + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let limiter = Arc::clone(&self.limiter);
        let config = Arc::clone(&self.config);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let key = match (config.key_extractor)(&request) {
                Ok(key) => key,
                Err(e) => {
                    config
                        .logger
                        .error(&format!("failed to extract rate limit key: {}", e));
                    return Ok(internal_server_error());
                }
            };

            let decision = match limiter.allow(&key).await {
                Ok(decision) => decision,
                Err(e) => {
                    metrics::record_store_error(e.kind());
                    config
                        .logger
                        .error(&format!("rate limit check failed for key '{}': {}", key, e));
                    return Ok(internal_server_error());
                }
            };

            metrics::record_decision(decision.allowed);

            if !decision.allowed {
                config.logger.debug(&format!(
                    "request denied for key '{}' (remaining: {}, limit: {})",
                    key, decision.remaining, decision.limit
                ));
                let mut response = (config.error_handler)(&RateLimitError::Exceeded, &decision);
                set_rate_limit_headers(response.headers_mut(), &decision);
                return Ok(response);
            }

            config.logger.debug(&format!(
                "request allowed for key '{}' (remaining: {}, limit: {})",
                key, decision.remaining, decision.limit
            ));

            let mut response = inner.call(request).await?;
            set_rate_limit_headers(response.headers_mut(), &decision);
            Ok(response)
        })
    }
}

fn set_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    let reset_at = SystemTime::now() + decision.reset_after;
    let reset_unix = reset_at
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_unix));
}

fn internal_server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}
