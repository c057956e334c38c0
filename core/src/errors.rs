//! Error taxonomy shared by every Larder component

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of error kinds surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    ValidationError,
    InternalError,
    NotFound,
    Forbidden,
}

impl ErrorCode {
    /// HTTP status a caller should answer with when no upstream status applies
    pub fn default_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::InternalError => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Forbidden => "FORBIDDEN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error tagged with its kind, a caller-facing status code and optional details.
///
/// Local failures are built with the named constructors below. Failures of an
/// upstream HTTP call are classified by the connector's `handle_api_error`,
/// which is the only place that builds errors from a status code.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ClassifiedError {
    pub code: ErrorCode,
    pub message: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Whether the failure is likely to succeed on a later attempt
    #[serde(default, skip_serializing)]
    pub transient: bool,
}

impl ClassifiedError {
    /// Build an error with an explicit status code
    pub fn new(code: ErrorCode, message: impl Into<String>, status_code: u16) -> Self {
        Self {
            code,
            message: message.into(),
            status_code,
            details: None,
            transient: false,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message, 400)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message, 401)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message, 403)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message, 404)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message, 500)
    }

    /// Missing or unusable configuration detected at construction time
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::internal(format!("Configuration error: {}", message.into()))
    }

    /// A single attempt exceeded its deadline
    pub fn timeout(after_ms: u64) -> Self {
        Self::new(
            ErrorCode::InternalError,
            format!("Upstream request timed out after {}ms", after_ms),
            504,
        )
        .into_transient()
    }

    /// Connection-level failure before any HTTP status was received
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalError,
            format!("Network error: {}", message.into()),
            502,
        )
        .into_transient()
    }

    /// Attach structured details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark the failure as transient (eligible for retry)
    pub fn into_transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn is_validation(&self) -> bool {
        self.code == ErrorCode::ValidationError
    }
}

/// Result type alias for Larder operations
pub type LarderResult<T> = Result<T, ClassifiedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::ValidationError).unwrap();
        assert_eq!(json, "\"VALIDATION_ERROR\"");

        let code: ErrorCode = serde_json::from_str("\"NOT_FOUND\"").unwrap();
        assert_eq!(code, ErrorCode::NotFound);
    }

    #[test]
    fn test_constructors_carry_canonical_status() {
        assert_eq!(ClassifiedError::validation("x").status_code, 400);
        assert_eq!(ClassifiedError::unauthorized("x").status_code, 401);
        assert_eq!(ClassifiedError::forbidden("x").status_code, 403);
        assert_eq!(ClassifiedError::not_found("x").status_code, 404);
        assert_eq!(ClassifiedError::internal("x").status_code, 500);
        assert_eq!(
            ClassifiedError::internal("x").status_code,
            ErrorCode::InternalError.default_status()
        );
    }

    #[test]
    fn test_transient_constructors() {
        let timeout = ClassifiedError::timeout(250);
        assert_eq!(timeout.code, ErrorCode::InternalError);
        assert!(timeout.is_transient());
        assert!(timeout.message.contains("250ms"));

        assert!(ClassifiedError::network("refused").is_transient());
        assert!(!ClassifiedError::validation("bad").is_transient());
    }

    #[test]
    fn test_display_includes_code() {
        let err = ClassifiedError::not_found("Recipe not found");
        assert_eq!(err.to_string(), "NOT_FOUND: Recipe not found");
    }

    #[test]
    fn test_serialized_shape_omits_transient() {
        let err = ClassifiedError::internal("boom").with_details(serde_json::json!({"k": 1}));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["code"], "INTERNAL_ERROR");
        assert_eq!(value["status_code"], 500);
        assert_eq!(value["details"]["k"], 1);
        assert!(value.get("transient").is_none());
    }
}
