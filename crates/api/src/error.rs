//! API error types with HTTP response mapping.

use auth::AuthError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Missing, invalid or expired credentials.
    Unauthorized(String),
    /// Authenticated, but not allowed to touch the resource.
    Forbidden(String),
    /// Resource not found.
    NotFound(String),
    /// The request clashes with the current state of the resource.
    Conflict(String),
    /// Internal server error. The detail is logged, never returned.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Reports a duplicate unique value as a bad request, as sign-up and
    /// profile updates do.
    pub fn conflict_as_bad_request(err: DomainError) -> Self {
        match err {
            DomainError::Conflict(msg) => ApiError::BadRequest(msg),
            other => other.into(),
        }
    }

    /// Reports a missing referenced entity as a bad request, as order
    /// placement does for an unknown product.
    pub fn missing_as_bad_request(err: DomainError) -> Self {
        match err {
            err @ DomainError::NotFound { .. } => ApiError::BadRequest(err.to_string()),
            other => other.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest(msg) => serde_json::json!({
                "error": "Bad Request",
                "message": msg,
            }),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal server error");
                serde_json::json!({ "error": "Internal server error" })
            }
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => serde_json::json!({ "error": msg }),
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => ApiError::BadRequest(msg),
            err @ DomainError::InsufficientStock { .. } => ApiError::BadRequest(err.to_string()),
            err @ DomainError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            DomainError::Forbidden(msg) => ApiError::Forbidden(msg),
            DomainError::Unauthorized(msg) => ApiError::Unauthorized(msg),
            DomainError::Conflict(msg) => ApiError::Conflict(msg),
            err @ DomainError::InvalidTransition { .. } => ApiError::Conflict(err.to_string()),
            DomainError::Auth(err) => err.into(),
            err @ DomainError::Storage(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired
            | AuthError::InvalidSignature
            | AuthError::Malformed(_)
            | AuthError::WrongKind { .. } => ApiError::Unauthorized(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
