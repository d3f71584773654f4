//! Input schemas
//!
//! An operation declares its input schema with `.input::<T>()`. The type is
//! deserialized from the decoded request input and then checked with
//! [`Validate`]. Any failure stops the request before middleware or handler
//! run and is answered with 400 and the list of [`FieldError`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use typed_rpc::validation::{Validate, ValidationResult, ValidationRules};
//!
//! #[derive(Debug, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct SetDiscordIdInput {
//!     discord_id: String,
//! }
//!
//! impl Validate for SetDiscordIdInput {
//!     fn validate(&self) -> ValidationResult {
//!         ValidationRules::new()
//!             .max_chars("discordId", &self.discord_id, 20)
//!             .build()
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Validation error for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// The name of the field that failed validation
    pub field: String,
    /// Human-readable error message
    pub message: String,
    /// Error code identifying the type of validation failure
    pub code: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }

    /// Create a "required" field error
    pub fn required(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(&field, format!("{} is required", field), "required")
    }

    /// Create a "max_length" field error
    pub fn max_length(field: impl Into<String>, max: usize) -> Self {
        let field = field.into();
        Self::new(
            &field,
            format!("{} must contain at most {} character(s)", field, max),
            "max_length",
        )
    }

    /// Create a "range" field error
    pub fn range(field: impl Into<String>, min: i64, max: i64) -> Self {
        let field = field.into();
        Self::new(
            &field,
            format!("{} must be between {} and {}", field, min, max),
            "range",
        )
    }

    /// Create a "pattern" field error
    pub fn pattern(field: impl Into<String>, description: &str) -> Self {
        let field = field.into();
        Self::new(
            &field,
            format!("{} must be {}", field, description),
            "pattern",
        )
    }

    /// Translate a deserialization failure into a field error.
    ///
    /// serde_json names the offending field between backticks for missing and
    /// unknown fields; everything else is attributed to the whole input.
    pub fn from_serde(err: &serde_json::Error) -> Self {
        let text = err.to_string();
        let field = text
            .split('`')
            .nth(1)
            .filter(|_| text.starts_with("missing field") || text.starts_with("unknown field"))
            .unwrap_or("input")
            .to_string();
        let code = if text.starts_with("missing field") {
            "required"
        } else {
            "invalid_type"
        };
        Self::new(field, text, code)
    }
}

/// Result of validating an input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the input is valid
    pub valid: bool,
    /// List of field-level errors (empty if valid)
    pub errors: Vec<FieldError>,
}

impl ValidationResult {
    /// Create a successful validation result
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// Create a validation result from a list of errors.
    /// If the list is empty, the result is valid.
    pub fn from_errors(errors: Vec<FieldError>) -> Self {
        if !errors.is_empty() {
            let field_names: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
            debug!(
                error_count = errors.len(),
                fields = ?field_names,
                "Validation failed"
            );
        }
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Get the errors
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

/// Trait for validatable input types.
///
/// Types without constraints beyond their shape return
/// [`ValidationResult::ok`].
pub trait Validate {
    /// Validate the input and return a result with any errors
    fn validate(&self) -> ValidationResult;
}

impl Validate for () {
    fn validate(&self) -> ValidationResult {
        ValidationResult::ok()
    }
}

/// Untyped input, accepted as decoded.
impl Validate for serde_json::Value {
    fn validate(&self) -> ValidationResult {
        ValidationResult::ok()
    }
}

/// Builder for validation rules.
///
/// Lengths are counted in characters, not bytes.
///
/// ```rust,ignore
/// let result = ValidationRules::new()
///     .required("name", &input.name)
///     .max_chars("name", &input.name, 50)
///     .pattern("color", &input.color, r"^#[0-9a-fA-F]{6}$", "a hex color")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct ValidationRules {
    errors: Vec<FieldError>,
}

impl ValidationRules {
    /// Create a new validation rules builder
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Validate that a string field is not blank
    pub fn required(mut self, field: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            trace!(field = %field, "Required field is empty");
            self.errors.push(FieldError::required(field));
        }
        self
    }

    /// Validate maximum string length in characters
    pub fn max_chars(mut self, field: &str, value: &str, max: usize) -> Self {
        let length = value.chars().count();
        if length > max {
            trace!(field = %field, length, max, "Field exceeds maximum length");
            self.errors.push(FieldError::max_length(field, max));
        }
        self
    }

    /// Validate that a number is within a range (inclusive)
    pub fn range(mut self, field: &str, value: i64, min: i64, max: i64) -> Self {
        if value < min || value > max {
            trace!(field = %field, value, min, max, "Field outside valid range");
            self.errors.push(FieldError::range(field, min, max));
        }
        self
    }

    /// Validate that a string matches a regex pattern.
    ///
    /// `description` completes the sentence "`field` must be ...".
    pub fn pattern(mut self, field: &str, value: &str, pattern: &str, description: &str) -> Self {
        match regex::Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(value) {
                    trace!(field = %field, pattern = %pattern, "Field does not match pattern");
                    self.errors.push(FieldError::pattern(field, description));
                }
            }
            Err(e) => {
                warn!(field = %field, pattern = %pattern, error = %e, "Invalid validation regex pattern");
                self.errors.push(FieldError::new(
                    field,
                    format!("Invalid validation pattern: {}", pattern),
                    "invalid_pattern",
                ));
            }
        }
        self
    }

    /// Build the validation result
    pub fn build(self) -> ValidationResult {
        ValidationResult::from_errors(self.errors)
    }
}

/// Check one segment of an operation name.
///
/// Segments are non-empty and made of ASCII alphanumerics and `_`, so they
/// can be used verbatim as URL path segments.
pub fn validate_segment(segment: &str) -> Result<(), String> {
    if segment.is_empty() {
        return Err("operation name contains an empty segment".to_string());
    }
    if let Some(invalid) = segment
        .chars()
        .find(|&ch| !ch.is_ascii_alphanumeric() && ch != '_')
    {
        return Err(format!(
            "invalid character '{}' in segment '{}'",
            invalid, segment
        ));
    }
    Ok(())
}

/// Check a dotted operation name such as `project.getUsage`.
pub fn validate_operation_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("operation name cannot be empty".to_string());
    }
    name.split('.').try_for_each(validate_segment)
}
