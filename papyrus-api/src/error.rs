//! Error Types for the Papyrus API
//!
//! This module defines error handling for the HTTP layer:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversion from the domain error taxonomy
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use papyrus_core::{
    ActivationError, ErrorKind, GeneratorError, PapyrusError, StorageError, ValidationError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Missing or wrong shared secret
    Unauthorized,

    /// Account exists but has not been activated
    Forbidden,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// No account for the given openid
    AccountNotFound,

    /// Activation code was never issued
    ActivationCodeNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Entity with the same identifier already exists
    EntityAlreadyExists,

    /// Activation code is owned by another account
    ActivationCodeClaimed,

    /// Account is already bound to a different code
    AccountAlreadyActivated,

    // ========================================================================
    // Upstream Errors (502, 504)
    // ========================================================================
    /// Identity provider or answer generator failed
    UpstreamFailure,

    /// Upstream call timed out
    Timeout,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// No free activation code could be found
    CodeSpaceExhausted,

    /// Database operation failed
    DatabaseError,

    /// Service is temporarily unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::InvalidInput | ErrorCode::MissingField => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound
            | ErrorCode::AccountNotFound
            | ErrorCode::ActivationCodeNotFound => StatusCode::NOT_FOUND,

            ErrorCode::EntityAlreadyExists
            | ErrorCode::ActivationCodeClaimed
            | ErrorCode::AccountAlreadyActivated => StatusCode::CONFLICT,

            ErrorCode::UpstreamFailure => StatusCode::BAD_GATEWAY,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // Store failures are transient and worth a retry.
            ErrorCode::DatabaseError | ErrorCode::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::InternalError | ErrorCode::CodeSpaceExhausted => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Invalid or missing secret",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::AccountNotFound => "Account not found",
            ErrorCode::ActivationCodeNotFound => "Activation code not found",
            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::ActivationCodeClaimed => "Activation code already claimed",
            ErrorCode::AccountAlreadyActivated => "Account already activated",
            ErrorCode::UpstreamFailure => "Upstream service failed",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::CodeSpaceExhausted => "Activation code space exhausted",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

/// Map the domain taxonomy onto HTTP-facing codes.
impl From<PapyrusError> for ApiError {
    fn from(err: PapyrusError) -> Self {
        let kind = err.kind();
        let code = match &err {
            PapyrusError::Storage(StorageError::NotFound { entity_type, .. }) => {
                match entity_type {
                    papyrus_core::EntityType::Account => ErrorCode::AccountNotFound,
                    papyrus_core::EntityType::ActivationCode => ErrorCode::ActivationCodeNotFound,
                    _ => ErrorCode::EntityNotFound,
                }
            }
            PapyrusError::Storage(StorageError::UniqueViolation { .. }) => {
                ErrorCode::EntityAlreadyExists
            }
            PapyrusError::Storage(StorageError::Unavailable { .. }) => {
                ErrorCode::ServiceUnavailable
            }
            PapyrusError::Storage(_) => ErrorCode::DatabaseError,
            PapyrusError::Generator(GeneratorError::Timeout { .. }) => ErrorCode::Timeout,
            PapyrusError::Generator(_) | PapyrusError::Identity(_) => ErrorCode::UpstreamFailure,
            PapyrusError::Validation(ValidationError::RequiredFieldMissing { .. }) => {
                ErrorCode::MissingField
            }
            PapyrusError::Validation(_) => ErrorCode::InvalidInput,
            PapyrusError::Activation(ActivationError::UnknownCode { .. }) => {
                ErrorCode::ActivationCodeNotFound
            }
            PapyrusError::Activation(ActivationError::CodeAlreadyClaimed { .. }) => {
                ErrorCode::ActivationCodeClaimed
            }
            PapyrusError::Activation(ActivationError::AccountAlreadyActivated { .. }) => {
                ErrorCode::AccountAlreadyActivated
            }
            PapyrusError::Activation(ActivationError::AccountNotActivated { .. }) => {
                ErrorCode::Forbidden
            }
            PapyrusError::Activation(ActivationError::CodeSpaceExhausted { .. }) => {
                ErrorCode::CodeSpaceExhausted
            }
            PapyrusError::Config(_) => ErrorCode::InternalError,
        };

        match kind {
            ErrorKind::StoreFailure | ErrorKind::Internal => {
                // Full detail goes to the log only.
                tracing::error!(error = %err, "request failed");
                ApiError::from_code(code)
            }
            ErrorKind::UpstreamFailure => {
                tracing::warn!(error = %err, "upstream call failed");
                ApiError::new(code, err.to_string())
            }
            _ => ApiError::new(code, err.to_string()),
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
