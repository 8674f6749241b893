pub mod layer;

pub use layer::{RateLimitLayer, RateLimitService};

use crate::errors::{RateLimitError, Result};
use crate::limiter::Decision;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;

/// Extracts the rate-limiting key from an incoming request. Common
/// implementations use the client address or an API key header.
pub type KeyExtractor = Arc<dyn Fn(&Request<Body>) -> Result<String> + Send + Sync>;

/// Builds the response sent when a request is denied. Receives the
/// [`RateLimitError::Exceeded`] sentinel and the full [`Decision`], giving
/// user code control over status, headers, and body.
pub type ErrorHandler = Arc<dyn Fn(&RateLimitError, &Decision) -> Response + Send + Sync>;

/// Debug/error sink used by the middleware.
///
/// Implement this to route middleware output into your own logging setup.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
    fn error(&self, message: &str);
}

/// Logger that discards everything. The default when none is configured.
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Logger backed by the `tracing` facade.
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "floodgate", "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "floodgate", "{}", message);
    }
}

/// Configurable parameters for the rate limiting middleware.
///
/// Three options are recognized: the key extractor, the error handler
/// invoked on denial, and the logger. Each has a working default: the
/// client address, a plain 429 with `Retry-After`, and a silent logger.
///
/// ```no_run
/// use axum::body::Body;
/// use axum::http::Request;
/// use floodgate::{MiddlewareConfig, TracingLogger};
///
/// let config = MiddlewareConfig::new()
///     .with_key_extractor(|request: &Request<Body>| {
///         request
///             .headers()
///             .get("x-api-key")
///             .and_then(|v| v.to_str().ok())
///             .map(str::to_string)
///             .ok_or_else(|| floodgate::RateLimitError::KeyExtraction("missing api key".into()))
///     })
///     .with_logger(TracingLogger);
/// ```
pub struct MiddlewareConfig {
    pub(crate) key_extractor: KeyExtractor,
    pub(crate) error_handler: ErrorHandler,
    pub(crate) logger: Arc<dyn Logger>,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            key_extractor: Arc::new(client_address_key),
            error_handler: Arc::new(default_error_handler),
            logger: Arc::new(NoopLogger),
        }
    }
}

impl MiddlewareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom function to identify clients, e.g. by API key or user
    /// id instead of the connecting address.
    pub fn with_key_extractor<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request<Body>) -> Result<String> + Send + Sync + 'static,
    {
        self.key_extractor = Arc::new(f);
        self
    }

    /// Use a custom handler for denied requests, e.g. to send a structured
    /// JSON error body.
    pub fn with_error_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&RateLimitError, &Decision) -> Response + Send + Sync + 'static,
    {
        self.error_handler = Arc::new(f);
        self
    }

    pub fn with_logger<L: Logger + 'static>(mut self, logger: L) -> Self {
        self.logger = Arc::new(logger);
        self
    }
}

/// Default key extractor: the client IP from [`ConnectInfo`].
///
/// Requires the app to be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`; otherwise
/// configure a key extractor that fits your deployment.
fn client_address_key(request: &Request<Body>) -> Result<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .ok_or_else(|| {
            RateLimitError::KeyExtraction(
                "no client address on request; serve with connect info or set a key extractor"
                    .to_string(),
            )
        })
}

/// Default error handler: 429 with a `Retry-After` of at least one second.
fn default_error_handler(_error: &RateLimitError, decision: &Decision) -> Response {
    let mut retry_after = decision.reset_after.as_secs_f64().ceil() as i64;
    if retry_after < 1 {
        retry_after = 1;
    }

    Response::builder()
        .status(StatusCode::TOO_MANY_REQUESTS)
        .header(header::RETRY_AFTER, retry_after)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from("Too Many Requests"))
        .unwrap_or_else(|_| StatusCode::TOO_MANY_REQUESTS.into_response())
}
