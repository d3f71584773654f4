//! Configuration for compiled routers.
//!
//! # Example
//! ```rust,ignore
//! use typed_rpc::RpcConfig;
//!
//! let config = RpcConfig::new()
//!     .with_base_path("/api")
//!     .with_max_body_size(256 * 1024)
//!     .with_development_errors(cfg!(debug_assertions));
//! config.validate()?;
//! ```

use crate::error::ErrorConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default prefix of every compiled route.
pub const DEFAULT_BASE_PATH: &str = "/api";

/// Default limit for POST bodies: 1 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigValidationError {
    /// base_path must start with '/'
    BasePathNotAbsolute(String),
    /// base_path contains a character that cannot appear in a route
    InvalidBasePath(String),
    /// max_body_size must be greater than 0
    InvalidMaxBodySize,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BasePathNotAbsolute(path) => {
                write!(f, "base_path must start with '/', got '{}'", path)
            }
            Self::InvalidBasePath(path) => {
                write!(f, "base_path '{}' contains characters not allowed in a route", path)
            }
            Self::InvalidMaxBodySize => {
                write!(f, "max_body_size must be greater than 0")
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Router configuration.
///
/// * `base_path` - Prefix of every route. Default: `/api`.
///
/// * `max_body_size` - Largest accepted POST body in bytes; larger bodies are
///   rejected with 413. Default: 1 MiB.
///
/// * `development_errors` - Render the `cause` of recognized errors.
///   Unknown errors never expose details. Default: false.
///
/// * `strict_envelopes` - For operations with an input schema, reject fields
///   that look like an envelope but fail to decode instead of passing the raw
///   text on. Default: true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub base_path: String,
    pub max_body_size: usize,
    pub development_errors: bool,
    pub strict_envelopes: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            development_errors: false,
            strict_envelopes: true,
        }
    }
}

impl RpcConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    #[must_use]
    pub fn with_development_errors(mut self, enabled: bool) -> Self {
        self.development_errors = enabled;
        self
    }

    #[must_use]
    pub fn with_strict_envelopes(mut self, strict: bool) -> Self {
        self.strict_envelopes = strict;
        self
    }

    /// Error rendering settings derived from this configuration.
    pub fn error_config(&self) -> ErrorConfig {
        ErrorConfig {
            development: self.development_errors,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.base_path.starts_with('/') {
            return Err(ConfigValidationError::BasePathNotAbsolute(
                self.base_path.clone(),
            ));
        }
        let allowed = |ch: char| ch.is_ascii_alphanumeric() || matches!(ch, '/' | '_' | '-' | '.');
        if !self.base_path.chars().all(allowed) || self.base_path.contains("//") {
            return Err(ConfigValidationError::InvalidBasePath(self.base_path.clone()));
        }
        if self.max_body_size == 0 {
            return Err(ConfigValidationError::InvalidMaxBodySize);
        }
        Ok(())
    }
}
