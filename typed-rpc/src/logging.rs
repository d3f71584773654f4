//! Request logging with tracing
//!
//! [`logging_middleware`] gives every request a UUID v7 [`RequestId`],
//! contributes it to the context under [`REQUEST_ID_KEY`] and logs the start,
//! outcome and duration of each operation. Requests slower than the
//! configured threshold are logged at warn level.
//!
//! ```rust,ignore
//! use typed_rpc::logging::{LogConfig, logging_middleware};
//!
//! let base = Procedure::<AppState>::new().use_middleware(logging_middleware(
//!     LogConfig::new()
//!         .with_slow_request_threshold(500)
//!         .exclude_operation("health"),
//! ));
//! ```
//!
//! The lifecycle functions at the bottom are called by the router compiler.

use crate::context::ContextPatch;
use crate::middleware::{Middleware, MiddlewareArgs};
use axum::http::Method;
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Context key the [`RequestId`] is stored under.
pub const REQUEST_ID_KEY: &str = "requestId";

/// Id of the logging middleware.
pub const LOGGING_MIDDLEWARE_ID: &str = "logging";

/// Default slow request threshold in milliseconds.
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 1000;

/// Length of [`RequestId::short`].
pub const SHORT_ID_LENGTH: usize = 8;

/// Unique identifier of one request.
///
/// UUID v7 carries a timestamp, so ids sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// First characters of the id, for compact log lines.
    pub fn short(&self) -> String {
        self.0.to_string().chars().take(SHORT_ID_LENGTH).collect()
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for RequestId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

/// Logging middleware configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Emit request logs at all; the request id is contributed regardless
    pub enabled: bool,
    /// Requests taking longer than this are logged at warn level
    pub slow_request_threshold: Duration,
    /// Operations (dotted names) that are never logged
    pub excluded_operations: HashSet<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            slow_request_threshold: Duration::from_millis(DEFAULT_SLOW_THRESHOLD_MS),
            excluded_operations: HashSet::new(),
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the slow request threshold in milliseconds.
    #[must_use]
    pub fn with_slow_request_threshold(mut self, millis: u64) -> Self {
        self.slow_request_threshold = Duration::from_millis(millis);
        self
    }

    #[must_use]
    pub fn exclude_operation(mut self, operation: impl Into<String>) -> Self {
        self.excluded_operations.insert(operation.into());
        self
    }

    /// Whether `operation` should be logged.
    pub fn should_log(&self, operation: &str) -> bool {
        self.enabled && !self.excluded_operations.contains(operation)
    }
}

/// Whether a request that took `elapsed` counts as slow.
pub fn should_log_slow_request(elapsed: Duration, config: &LogConfig) -> bool {
    elapsed > config.slow_request_threshold
}

/// Middleware assigning a [`RequestId`] and logging every request.
pub fn logging_middleware<S: Send + Sync + 'static>(config: LogConfig) -> Middleware<S> {
    let config = std::sync::Arc::new(config);
    Middleware::from_fn(LOGGING_MIDDLEWARE_ID, move |args: MiddlewareArgs<S>| {
        let config = std::sync::Arc::clone(&config);
        async move {
            let request_id = RequestId::new();
            let patch = ContextPatch::new().insert(REQUEST_ID_KEY, request_id);
            let operation = args.request.operation.clone();

            if !config.should_log(&operation) {
                return args.next.run(patch).await;
            }

            let kind = args.request.kind;
            debug!(
                request_id = %request_id,
                operation = %operation,
                kind = %kind,
                "Operation started"
            );

            let start = Instant::now();
            let result = args.next.run(patch).await;
            let elapsed = start.elapsed();
            let duration_ms = elapsed.as_millis() as u64;

            match &result {
                Ok(reply) if should_log_slow_request(elapsed, &config) => warn!(
                    request_id = %request_id,
                    operation = %operation,
                    status = reply.status.as_u16(),
                    duration_ms,
                    threshold_ms = config.slow_request_threshold.as_millis() as u64,
                    "Slow operation"
                ),
                Ok(reply) => info!(
                    request_id = %request_id,
                    operation = %operation,
                    status = reply.status.as_u16(),
                    duration_ms,
                    "Operation completed"
                ),
                Err(error) => info!(
                    request_id = %request_id,
                    operation = %operation,
                    code = %error.code,
                    status = error.status().as_u16(),
                    duration_ms,
                    "Operation failed"
                ),
            }

            result
        }
    })
    .provides::<RequestId>(REQUEST_ID_KEY)
}

// =============================================================================
// Lifecycle Logging
// =============================================================================

/// Log router compilation. Logged at Info level.
pub fn log_router_compiled(operation_count: usize, base_path: &str) {
    info!(
        operation_count,
        base_path = %base_path,
        "Router compiled"
    );
}

/// Log registration of a single route. Logged at Trace level.
pub fn log_route_registered(operation: &str, method: &Method, path: &str) {
    trace!(
        operation = %operation,
        method = %method,
        path = %path,
        "Route registered"
    );
}
