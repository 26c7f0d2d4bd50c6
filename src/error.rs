// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::credentials::CredentialError;
use crate::database::DatabaseError;
use crate::pool::PoolError;
use crate::registry::RegistryError;
use crate::schema::{SchemaError, SchemaViolation};
use crate::store::StoreError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field: String,
        reason: String,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (project database unreachable or failing)
    UpstreamUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::UpstreamUnavailable(_) => 502,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::UpstreamUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field, reason } => json!({
                "error": message,
                "code": self.error_code(),
                "field": field,
                "reason": reason
            }),
            _ => json!({
                "error": self.message(),
                "code": self.error_code()
            }),
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let field = field.into();
        let reason = reason.into();
        ApiError::ValidationError {
            message: format!("Validation failed: field '{}' {}", field, reason),
            field,
            reason,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        ApiError::UpstreamUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        tracing::error!("Credential generation failed: {}", err);
        ApiError::internal_server_error("Failed to generate credentials")
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        // Don't expose internal SQL errors to clients
        tracing::error!("Metadata database error: {}", err);
        ApiError::internal_server_error("Failed to persist gateway metadata")
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::InvalidInput(msg) => ApiError::bad_request(msg),
            RegistryError::NotFound(_) => ApiError::not_found("Project not found"),
            RegistryError::DuplicateApiKey => ApiError::conflict("API key already in use"),
            RegistryError::Persistence(e) => e.into(),
        }
    }
}

impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Invalid(msg) => ApiError::bad_request(format!("Invalid schema: {}", msg)),
            SchemaError::Persistence(e) => e.into(),
        }
    }
}

impl From<SchemaViolation> for ApiError {
    fn from(violation: SchemaViolation) -> Self {
        ApiError::validation_error(violation.field, violation.reason)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CollectionExists(name) => {
                ApiError::conflict(format!("Collection '{}' already exists", name))
            }
            StoreError::CollectionNotFound(_) => ApiError::not_found("Collection not found"),
            StoreError::InvalidDocument(msg) => ApiError::bad_request(format!("Invalid document: {}", msg)),
            StoreError::Connection(_) | StoreError::Driver(_) => {
                // Log the real error but return generic message
                tracing::error!("Project database error: {}", err);
                ApiError::upstream_unavailable("Project database error")
            }
        }
    }
}

impl From<PoolError> for ApiError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::UnknownProject(_) => ApiError::not_found("Project not found"),
            PoolError::Store(e) => e.into(),
            PoolError::Connect(_) | PoolError::Timeout(_) => {
                tracing::error!("Project database unavailable: {}", err);
                ApiError::upstream_unavailable("Project database unavailable")
            }
        }
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
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
