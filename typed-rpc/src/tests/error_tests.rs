//! Property-based tests for error handling
//!
//! These tests validate that every error renders into the uniform envelope
//! and that unknown errors never leak their cause.

use crate::error::UNKNOWN_ERROR_MESSAGE;
use crate::{ErrorBody, ErrorConfig, ErrorType, RpcError, RpcErrorCode};
use axum::http::StatusCode;
use proptest::prelude::*;

/// Strategy to generate arbitrary RpcErrorCode values
fn arb_error_code() -> impl Strategy<Value = RpcErrorCode> {
    prop_oneof![
        Just(RpcErrorCode::BadRequest),
        Just(RpcErrorCode::Unauthorized),
        Just(RpcErrorCode::PaymentRequired),
        Just(RpcErrorCode::Forbidden),
        Just(RpcErrorCode::NotFound),
        Just(RpcErrorCode::ValidationError),
        Just(RpcErrorCode::Conflict),
        Just(RpcErrorCode::PayloadTooLarge),
        Just(RpcErrorCode::RateLimited),
        Just(RpcErrorCode::InternalError),
        Just(RpcErrorCode::NotImplemented),
        Just(RpcErrorCode::ServiceUnavailable),
        Just(RpcErrorCode::Unknown),
    ]
}

/// Strategy to generate arbitrary RpcError values
fn arb_rpc_error() -> impl Strategy<Value = RpcError> {
    (
        arb_error_code(),
        ".*",                                  // arbitrary message
        proptest::option::of(any::<String>()), // optional cause
    )
        .prop_map(|(code, message, cause)| {
            let mut error = RpcError::new(code, message);
            if let Some(c) = cause {
                error = error.with_cause(c);
            }
            error
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every error renders into an envelope that parses back unchanged.
    #[test]
    fn prop_body_round_trip(error in arb_rpc_error()) {
        let body = error.to_body(&ErrorConfig::development());
        let json = serde_json::to_value(&body).unwrap();

        prop_assert!(json.get("error").is_some());
        prop_assert!(json.get("message").is_some());
        prop_assert!(json.get("type").is_some());

        let restored: ErrorBody = serde_json::from_value(json).unwrap();
        prop_assert_eq!(restored, body);
    }

    /// Unknown errors render the fixed message and no cause, in any mode.
    #[test]
    fn prop_unknown_errors_hide_details(cause in ".*", development in any::<bool>()) {
        let config = ErrorConfig { development };
        let body = RpcError::unknown(cause).to_body(&config);
        prop_assert_eq!(body.kind, ErrorType::UnknownError);
        prop_assert_eq!(body.error, "Unknown Error");
        prop_assert_eq!(body.message, UNKNOWN_ERROR_MESSAGE);
        prop_assert!(body.cause.is_none());
    }

    /// Recognized errors expose their cause only in development mode.
    #[test]
    fn prop_causes_follow_the_mode(code in arb_error_code(), cause in ".+") {
        prop_assume!(code != RpcErrorCode::Unknown);
        let error = RpcError::new(code, "failed").with_cause(cause.clone());
        prop_assert_eq!(error.to_body(&ErrorConfig::development()).cause, Some(cause));
        prop_assert!(error.to_body(&ErrorConfig::production()).cause.is_none());
    }

    /// Error codes serialize to their SCREAMING_SNAKE_CASE name and back.
    #[test]
    fn prop_error_code_serde(code in arb_error_code()) {
        let json = serde_json::to_value(code).unwrap();
        prop_assert_eq!(json.as_str(), Some(code.as_str()));
        let restored: RpcErrorCode = serde_json::from_value(json).unwrap();
        prop_assert_eq!(code, restored);
    }

    /// Explicit statuses survive, and the code is the closest match.
    #[test]
    fn prop_explicit_status_is_kept(status in 400u16..600) {
        let status = StatusCode::from_u16(status).unwrap();
        let error = RpcError::http(status, "explicit");
        prop_assert_eq!(error.status(), status);
        prop_assert_eq!(error.error_type(), ErrorType::HttpException);
        prop_assert_eq!(error.code.is_client_error(), status.is_client_error());
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::FieldError;

    #[test]
    fn test_error_display_format() {
        let error = RpcError::not_found("Category not found");
        assert_eq!(format!("{}", error), "[NOT_FOUND] Category not found");
    }

    #[test]
    fn test_validation_envelope_lists_issues() {
        let error = RpcError::invalid_input(vec![
            FieldError::max_length("discordId", 20),
            FieldError::required("name"),
        ]);
        let json = serde_json::to_value(error.to_body(&ErrorConfig::production())).unwrap();
        assert_eq!(json["error"], "Invalid input");
        assert_eq!(json["type"], "ValidationError");
        assert_eq!(json["message"], "2 fields failed validation");
        assert_eq!(json["issues"][0]["field"], "discordId");
        assert_eq!(json["issues"][1]["code"], "required");
    }

    #[test]
    fn test_error_code_classification() {
        assert!(RpcErrorCode::BadRequest.is_client_error());
        assert!(RpcErrorCode::PaymentRequired.is_client_error());
        assert!(!RpcErrorCode::BadRequest.is_server_error());

        assert!(RpcErrorCode::InternalError.is_server_error());
        assert!(RpcErrorCode::Unknown.is_server_error());
        assert!(!RpcErrorCode::InternalError.is_client_error());
    }
}
