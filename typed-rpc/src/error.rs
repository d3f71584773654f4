//! Error types for RPC operations
//!
//! Every failure raised by a middleware, a handler or the framework itself is
//! an [`RpcError`]. The router's per-request error boundary is the single
//! place that turns it into an HTTP response carrying the uniform envelope:
//!
//! ```json
//! { "error": "Unauthorized", "message": "...", "type": "HTTPException" }
//! ```
//!
//! # Error Codes
//!
//! Error codes are represented by the [`RpcErrorCode`] enum. Each code maps to
//! an HTTP status and to one of the three wire-level [`ErrorType`]s.
//!
//! # Example
//! ```rust,ignore
//! use typed_rpc::{RpcError, RpcErrorCode};
//!
//! let error = RpcError::new(RpcErrorCode::NotFound, "Category not found");
//! let error = RpcError::forbidden("Upgrade your plan"); // Convenience method
//! let error = RpcError::http(StatusCode::PAYMENT_REQUIRED, "Quota exceeded");
//! ```

use crate::validation::FieldError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Message rendered for every error the framework does not recognize.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Type-safe error codes for RPC operations.
///
/// When serialized to JSON, codes are converted to SCREAMING_SNAKE_CASE
/// (e.g., `NotFound` becomes `"NOT_FOUND"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum RpcErrorCode {
    // Client errors (4xx)
    /// The request was malformed or invalid
    BadRequest,
    /// Authentication is required
    Unauthorized,
    /// The caller must pay or upgrade before retrying
    PaymentRequired,
    /// The authenticated principal lacks permission
    Forbidden,
    /// The requested resource was not found
    NotFound,
    /// Input failed schema validation
    ValidationError,
    /// The request conflicts with current state
    Conflict,
    /// The request payload exceeds size limits
    PayloadTooLarge,
    /// Too many requests
    RateLimited,

    // Server errors (5xx)
    /// An internal error the code raised deliberately
    InternalError,
    /// The requested functionality is not implemented
    NotImplemented,
    /// The service is temporarily unavailable
    ServiceUnavailable,

    /// Anything the framework does not recognize: collaborator failures,
    /// serialization failures, panics. Never exposes its cause.
    Unknown,
}

impl RpcErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::PaymentRequired => "PAYMENT_REQUIRED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Conflict => "CONFLICT",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::RateLimited => "RATE_LIMITED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// HTTP status this code is rendered with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest | Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalError | Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Best matching code for an explicit HTTP status.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Self::BadRequest,
            StatusCode::UNAUTHORIZED => Self::Unauthorized,
            StatusCode::PAYMENT_REQUIRED => Self::PaymentRequired,
            StatusCode::FORBIDDEN => Self::Forbidden,
            StatusCode::NOT_FOUND => Self::NotFound,
            StatusCode::CONFLICT => Self::Conflict,
            StatusCode::PAYLOAD_TOO_LARGE => Self::PayloadTooLarge,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited,
            StatusCode::NOT_IMPLEMENTED => Self::NotImplemented,
            StatusCode::SERVICE_UNAVAILABLE => Self::ServiceUnavailable,
            s if s.is_client_error() => Self::BadRequest,
            _ => Self::InternalError,
        }
    }

    /// Wire-level error kind.
    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::ValidationError => ErrorType::ValidationError,
            Self::Unknown => ErrorType::UnknownError,
            _ => ErrorType::HttpException,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The `type` field of the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    /// A recognized error carrying an explicit status
    #[serde(rename = "HTTPException")]
    HttpException,
    /// Input failed schema validation
    ValidationError,
    /// Anything else
    UnknownError,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HttpException => write!(f, "HTTPException"),
            Self::ValidationError => write!(f, "ValidationError"),
            Self::UnknownError => write!(f, "UnknownError"),
        }
    }
}

/// RPC error with type-safe code and message.
///
/// # Example
/// ```rust,ignore
/// use typed_rpc::{RpcError, RpcErrorCode};
///
/// let error = RpcError::new(RpcErrorCode::NotFound, "Category not found")
///     .with_cause("no row for name 'sales'");
/// ```
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}")]
pub struct RpcError {
    /// Type-safe error code
    pub code: RpcErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Field-level failures, only set for validation errors
    pub issues: Vec<FieldError>,
    /// Cause for debugging (never rendered for unknown errors)
    pub cause: Option<String>,
    /// Explicit status when it differs from the code's default
    status: Option<StatusCode>,
}

impl RpcError {
    /// Create a new error with code and message.
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            issues: Vec::new(),
            cause: None,
            status: None,
        }
    }

    /// Create a recognized error with an explicit HTTP status.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        let mut error = Self::new(RpcErrorCode::from_status(status), message);
        if error.code.status() != status {
            error.status = Some(status);
        }
        error
    }

    /// Wrap an error the framework does not recognize.
    ///
    /// The original error is kept as `cause` for logging only.
    pub fn unknown(cause: impl fmt::Display) -> Self {
        Self::new(RpcErrorCode::Unknown, UNKNOWN_ERROR_MESSAGE).with_cause(cause.to_string())
    }

    /// Create a validation error carrying field-level failures.
    pub fn invalid_input(issues: Vec<FieldError>) -> Self {
        let message = match issues.as_slice() {
            [] => "Invalid input".to_string(),
            [single] => single.message.clone(),
            many => format!("{} fields failed validation", many.len()),
        };
        Self {
            issues,
            ..Self::new(RpcErrorCode::ValidationError, message)
        }
    }

    /// Add a cause string for debugging.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// HTTP status of the rendered response.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or_else(|| self.code.status())
    }

    /// Wire-level error kind.
    pub fn error_type(&self) -> ErrorType {
        self.code.error_type()
    }

    /// Build the envelope sent to clients.
    pub fn to_body(&self, config: &ErrorConfig) -> ErrorBody {
        match self.error_type() {
            ErrorType::UnknownError => ErrorBody {
                error: "Unknown Error".to_string(),
                message: UNKNOWN_ERROR_MESSAGE.to_string(),
                kind: ErrorType::UnknownError,
                issues: Vec::new(),
                cause: None,
            },
            kind => ErrorBody {
                error: match kind {
                    ErrorType::ValidationError => "Invalid input".to_string(),
                    _ => self
                        .status()
                        .canonical_reason()
                        .unwrap_or("Server Error")
                        .to_string(),
                },
                message: self.message.clone(),
                kind,
                issues: self.issues.clone(),
                cause: if config.development {
                    self.cause.clone()
                } else {
                    None
                },
            },
        }
    }

    /// Render the error as an HTTP response.
    pub fn into_response_with(self, config: &ErrorConfig) -> Response {
        let status = self.status();
        (status, axum::Json(self.to_body(config))).into_response()
    }

    // Convenience constructors

    /// Create a NOT_FOUND error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::NotFound, message)
    }

    /// Create a BAD_REQUEST error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::BadRequest, message)
    }

    /// Create a VALIDATION_ERROR error without field details.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::ValidationError, message)
    }

    /// Create an UNAUTHORIZED error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Unauthorized, message)
    }

    /// Create a FORBIDDEN error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Forbidden, message)
    }

    /// Create an INTERNAL_ERROR error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalError, message)
    }

    /// Create a CONFLICT error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Conflict, message)
    }

    /// Create a NOT_FOUND error for a path that maps to no operation.
    pub fn route_not_found(path: &str) -> Self {
        Self::not_found(format!("No operation is registered at '{}'", path))
    }

    /// Create a PAYLOAD_TOO_LARGE error.
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::PayloadTooLarge, message)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::unknown(format!("JSON error: {}", err))
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        self.into_response_with(&ErrorConfig::default())
    }
}

/// Result type alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Uniform error envelope carried by every failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short reason ("Unauthorized", "Invalid input", "Unknown Error")
    pub error: String,
    /// Human-readable message
    pub message: String,
    /// Error kind
    #[serde(rename = "type")]
    pub kind: ErrorType,
    /// Field-level validation failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<FieldError>,
    /// Cause, rendered in development mode only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// Controls how much of an error reaches the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorConfig {
    /// Expose the `cause` of recognized errors
    pub development: bool,
}

impl ErrorConfig {
    /// Production settings: no causes.
    pub fn production() -> Self {
        Self { development: false }
    }

    /// Development settings: causes of recognized errors are rendered.
    pub fn development() -> Self {
        Self { development: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_map_to_statuses() {
        assert_eq!(RpcErrorCode::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RpcErrorCode::ValidationError.status(), StatusCode::BAD_REQUEST);
        assert_eq!(RpcErrorCode::Unknown.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(RpcErrorCode::Forbidden.is_client_error());
        assert!(RpcErrorCode::ServiceUnavailable.is_server_error());
    }

    #[test]
    fn test_error_types() {
        assert_eq!(RpcError::forbidden("x").error_type(), ErrorType::HttpException);
        assert_eq!(RpcError::validation("x").error_type(), ErrorType::ValidationError);
        assert_eq!(RpcError::unknown("boom").error_type(), ErrorType::UnknownError);
    }

    #[test]
    fn test_http_keeps_explicit_status() {
        let error = RpcError::http(StatusCode::IM_A_TEAPOT, "short and stout");
        assert_eq!(error.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(error.code, RpcErrorCode::BadRequest);

        let error = RpcError::http(StatusCode::FORBIDDEN, "nope");
        assert_eq!(error.status(), StatusCode::FORBIDDEN);
        assert_eq!(error.code, RpcErrorCode::Forbidden);
    }

    #[test]
    fn test_unknown_body_hides_cause() {
        let error = RpcError::unknown("connection refused: db-primary-7:5432");
        let body = error.to_body(&ErrorConfig::development());
        assert_eq!(body.error, "Unknown Error");
        assert_eq!(body.message, UNKNOWN_ERROR_MESSAGE);
        assert_eq!(body.kind, ErrorType::UnknownError);
        assert!(body.cause.is_none());
    }

    #[test]
    fn test_recognized_body() {
        let error = RpcError::unauthorized("Please sign in").with_cause("no session");
        let body = error.to_body(&ErrorConfig::production());
        assert_eq!(body.error, "Unauthorized");
        assert_eq!(body.message, "Please sign in");
        assert!(body.cause.is_none());

        let body = error.to_body(&ErrorConfig::development());
        assert_eq!(body.cause.as_deref(), Some("no session"));
    }

    #[test]
    fn test_body_wire_shape() {
        let body = RpcError::invalid_input(vec![FieldError::max_length("discordId", 20)])
            .to_body(&ErrorConfig::default());
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["type"], "ValidationError");
        assert_eq!(json["error"], "Invalid input");
        assert_eq!(json["issues"][0]["field"], "discordId");
        assert!(json.get("cause").is_none());

        let json = serde_json::to_value(RpcError::forbidden("no").to_body(&ErrorConfig::default()))
            .unwrap();
        assert_eq!(json["type"], "HTTPException");
        assert!(json.get("issues").is_none());
    }

    #[test]
    fn test_serde_error_is_unknown() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let error: RpcError = err.into();
        assert_eq!(error.code, RpcErrorCode::Unknown);
    }
}
