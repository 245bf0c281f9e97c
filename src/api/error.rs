//! Structured API error responses with error codes
//!
//! Every failure leaves the service as the same JSON envelope, with a stable
//! machine-readable code. Authentication failures all share one code
//! and one message whatever check actually failed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;
use crate::infra::StoreError;

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication errors (1xxx)
    /// Any credential check failed
    InvalidCredentials,
    /// Authenticated, but a required scope is missing
    InsufficientScope,

    // Validation errors (3xxx)
    /// Request body is malformed
    InvalidRequestBody,
    /// No credential header presented
    MissingCredential,
    /// Credential header present but unparseable
    MalformedCredential,
    /// Field value is invalid
    InvalidFieldValue,

    // Resource errors (4xxx)
    /// Requested resource not found
    ResourceNotFound,

    // Infrastructure errors (8xxx)
    /// Dependency unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn numeric_code(&self) -> u32 {
        match self {
            ErrorCode::InvalidCredentials => 1001,
            ErrorCode::InsufficientScope => 1002,

            ErrorCode::InvalidRequestBody => 3001,
            ErrorCode::MissingCredential => 3002,
            ErrorCode::MalformedCredential => 3003,
            ErrorCode::InvalidFieldValue => 3004,

            ErrorCode::ResourceNotFound => 4001,

            ErrorCode::ServiceUnavailable => 8002,
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ErrorCode::InsufficientScope => StatusCode::FORBIDDEN,

            ErrorCode::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ErrorCode::MissingCredential => StatusCode::BAD_REQUEST,
            ErrorCode::MalformedCredential => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidFieldValue => StatusCode::BAD_REQUEST,

            ErrorCode::ResourceNotFound => StatusCode::NOT_FOUND,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code_str = match self {
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::InsufficientScope => "INSUFFICIENT_SCOPE",
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::MissingCredential => "MISSING_CREDENTIAL",
            ErrorCode::MalformedCredential => "MALFORMED_CREDENTIAL",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        };
        write!(f, "{}", code_str)
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error details
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Related resource ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                details: None,
                resource_id: None,
            },
        }
    }

    /// Set additional details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    /// Set related resource ID
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    /// Get the HTTP status code
    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code_str = self.error.code.to_string();
        let mut response = (status, Json(self)).into_response();

        // Add error code header for easier debugging
        if let Ok(code_value) = axum::http::HeaderValue::from_str(&code_str) {
            response.headers_mut().insert(
                axum::http::header::HeaderName::from_static("x-error-code"),
                code_value,
            );
        }

        response
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential => {
                ApiError::new(ErrorCode::MissingCredential, "Credential required")
            }
            AuthError::MalformedCredential(_) => {
                ApiError::new(ErrorCode::MalformedCredential, "Malformed credential")
            }
            AuthError::InsufficientScope(scope) => ApiError::new(
                ErrorCode::InsufficientScope,
                format!("Scope {} required", scope),
            )
            .with_details(serde_json::json!({ "required_scope": scope })),
            AuthError::ClientRejected(_)
            | AuthError::TokenRejected(_)
            | AuthError::InvalidApiKey
            | AuthError::KeyUnavailable(_) => {
                ApiError::new(ErrorCode::InvalidCredentials, "Authentication failed")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => not_found("Expense", id),
            StoreError::Invalid { field, message } => validation_error(field, message),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Create a not found error for a specific resource type
pub fn not_found(resource_type: &str, id: impl std::fmt::Display) -> ApiError {
    ApiError::new(
        ErrorCode::ResourceNotFound,
        format!("{} not found: {}", resource_type, id),
    )
    .with_resource_id(id.to_string())
}

/// Create a validation error with field details
pub fn validation_error(field: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::InvalidFieldValue, message.into())
        .with_details(serde_json::json!({ "field": field }))
}

/// Create a malformed-body error
pub fn invalid_body(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::InvalidRequestBody, message.into())
}

// ============================================================================
// Tests
// ============================================================================
