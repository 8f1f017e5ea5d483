// HTTP API Error Types
use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::{RecordError, StoreError};
use crate::resources::FieldErrors;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 401 Unauthorized
    Unauthenticated(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 400 Bad Request
    ValidationFailed {
        message: String,
        field_errors: Option<FieldErrors>,
    },

    // 408 Request Timeout
    Timeout(String),

    // 500 Internal Server Error, carrying the raw upstream message for diagnosis
    UpstreamFailure {
        message: String,
        details: Option<String>,
    },
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationFailed { .. } => StatusCode::BAD_REQUEST,
            ApiError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ApiError::UpstreamFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::Unauthenticated(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::ValidationFailed { message, .. } => message,
            ApiError::Timeout(msg) => msg,
            ApiError::UpstreamFailure { message, .. } => message,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::ValidationFailed { .. } => "VALIDATION_FAILED",
            ApiError::Timeout(_) => "REQUEST_TIMEOUT",
            ApiError::UpstreamFailure { .. } => "UPSTREAM_FAILURE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "success": false,
            "error": self.message(),
            "code": self.error_code()
        });

        match self {
            ApiError::ValidationFailed { field_errors: Some(field_errors), .. } => {
                response["field_errors"] = json!(field_errors);
            }
            ApiError::UpstreamFailure { details: Some(details), .. } => {
                response["details"] = json!(details);
            }
            _ => {}
        }

        response
    }
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::Unauthenticated(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::ValidationFailed { message: message.into(), field_errors: None }
    }

    pub fn validation_fields(message: impl Into<String>, field_errors: FieldErrors) -> Self {
        ApiError::ValidationFailed { message: message.into(), field_errors: Some(field_errors) }
    }

    pub fn upstream(message: impl Into<String>, details: impl Into<String>) -> Self {
        ApiError::UpstreamFailure { message: message.into(), details: Some(details.into()) }
    }
}

// Convert other error types to ApiError
impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::InvalidJson(msg) => ApiError::validation(msg),
            RecordError::Invalid(field_errors) => ApiError::validation_fields("Invalid or missing fields", field_errors),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ApiError::validation(msg),
            StoreError::PermissionDenied(msg) => {
                tracing::warn!(details = %msg, "store refused statement");
                ApiError::upstream("The data store refused the operation", msg)
            }
            other => {
                tracing::error!(error = %other, "store error");
                ApiError::upstream("An error occurred while processing your request", other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_envelope_carries_field_errors() {
        let mut fields = FieldErrors::new();
        fields.insert("nombres".into(), "This field is required".into());
        let body = ApiError::validation_fields("Invalid or missing fields", fields).to_json();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["code"], json!("VALIDATION_FAILED"));
        assert_eq!(body["field_errors"]["nombres"], json!("This field is required"));
        assert!(body.get("details").is_none());
    }

    #[test]
    fn permission_denied_maps_to_upstream_with_details() {
        let err: ApiError = StoreError::PermissionDenied("new row violates row-level security policy".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = err.to_json();
        assert_eq!(body["code"], json!("UPSTREAM_FAILURE"));
        assert_eq!(body["details"], json!("new row violates row-level security policy"));
    }

    #[test]
    fn conflict_is_a_validation_failure() {
        let err: ApiError = StoreError::Conflict("duplicate key".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
