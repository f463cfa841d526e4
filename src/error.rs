// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::password::PasswordError;
use crate::auth::token::TokenError;
use crate::database::DatabaseError;

pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),
    InvalidToken,

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 405 Method Not Allowed
    MethodNotAllowed(String),

    // 409 Conflict
    Conflict(String),

    // 422 Unprocessable Entity
    UnprocessableEntity {
        message: String,
        field_errors: HashMap<String, String>,
    },

    // 429 Too Many Requests
    TooManyRequests(String),

    // 500 Internal Server Error; the detail is logged, never sent
    InternalServerError(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::InvalidToken => "invalid or missing authentication token",
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::MethodNotAllowed(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::UnprocessableEntity { message, .. } => message,
            ApiError::TooManyRequests(msg) => msg,
            ApiError::InternalServerError(_) => SERVER_ERROR_MESSAGE,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::InvalidToken => "INVALID_TOKEN",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::UnprocessableEntity { .. } => "UNPROCESSABLE_ENTITY",
            ApiError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::UnprocessableEntity { message, field_errors } => json!({
                "error": true,
                "message": message,
                "code": self.error_code(),
                "field_errors": field_errors
            }),
            _ => json!({
                "error": true,
                "message": self.message(),
                "code": self.error_code()
            }),
        }
    }
}

// Constructors for the responses the auth core and handlers emit
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found() -> Self {
        ApiError::NotFound("the requested resource could not be found".to_string())
    }

    pub fn method_not_allowed() -> Self {
        ApiError::MethodNotAllowed("the method is not supported for this resource".to_string())
    }

    pub fn authentication_required() -> Self {
        ApiError::Unauthorized("you must be authenticated to access this resource".to_string())
    }

    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("invalid authentication credentials".to_string())
    }

    pub fn inactive_account() -> Self {
        ApiError::Forbidden("your user account must be activated to access this resource".to_string())
    }

    pub fn not_permitted() -> Self {
        ApiError::Forbidden(
            "your user account doesn't have the necessary permissions to access this resource".to_string(),
        )
    }

    pub fn edit_conflict() -> Self {
        ApiError::Conflict("unable to update the record due to an edit conflict, please try again".to_string())
    }

    pub fn rate_limit_exceeded() -> Self {
        ApiError::TooManyRequests("rate limit exceeded".to_string())
    }

    pub fn failed_validation(field_errors: HashMap<String, String>) -> Self {
        ApiError::UnprocessableEntity {
            message: "the request failed validation".to_string(),
            field_errors,
        }
    }

    pub fn field_error(field: &str, message: &str) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), message.to_string());
        Self::failed_validation(field_errors)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        ApiError::InternalServerError(detail.into())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound => ApiError::not_found(),
            DatabaseError::DuplicateEmail => ApiError::field_error("email", "email address already in use"),
            DatabaseError::DuplicateRoleName => ApiError::field_error("role_name", "role name already in use"),
            DatabaseError::EditConflict => ApiError::edit_conflict(),
            DatabaseError::RoleReference => ApiError::field_error("role_id", "no matching role found"),
            // Don't expose storage errors to clients
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::internal(err.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Database(e) => e.into(),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for ApiError {
    fn from(_: axum::extract::rejection::PathRejection) -> Self {
        ApiError::not_found()
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::InternalServerError(detail) => write!(f, "internal error: {}", detail),
            other => write!(f, "{}", other.message()),
        }
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum. Runs inside the request span,
// so the log line carries method and URI.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::InternalServerError(detail) = &self {
            tracing::error!(error = %detail, "request failed");
        }

        let mut response = (self.status_code(), Json(self.to_json())).into_response();
        if matches!(self, ApiError::InvalidToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
