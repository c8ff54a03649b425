/// Unified error types for the user management service
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed request fields (login, name, gender, dates)
    #[error("{0}")]
    Validation(String),

    /// Login already used by another account (active or revoked)
    #[error("Login '{0}' is already in use")]
    DuplicateLogin(String),

    /// Account lookup failed
    #[error("User not found")]
    NotFound,

    /// Account is missing or soft-deleted
    #[error("User not found or revoked")]
    NotFoundOrRevoked,

    /// Restore target is missing or still active
    #[error("User not found or not revoked")]
    NotFoundOrNotRevoked,

    /// Authorization denied
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing, malformed or expired bearer token
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    /// Login or self-authentication failed; deliberately says nothing about which factor
    #[error("Invalid login or password")]
    InvalidCredential,

    /// Current password supplied to a password change did not verify
    #[error("Old password is incorrect")]
    BadCredential,

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Unexpected persistence failure
    #[error("Store failure: {0}")]
    Store(#[from] sqlx::Error),

    /// Migration failure at startup
    #[error("Migration failure: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Token signing failures
    #[error("Token error: {0}")]
    Token(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable kind, written to the `error` field of the body
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "ValidationError",
            ApiError::DuplicateLogin(_) => "DuplicateLogin",
            ApiError::NotFound => "NotFound",
            ApiError::NotFoundOrRevoked => "NotFoundOrRevoked",
            ApiError::NotFoundOrNotRevoked => "NotFoundOrNotRevoked",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::Unauthenticated(_) => "Unauthenticated",
            ApiError::InvalidCredential => "InvalidCredential",
            ApiError::BadCredential => "BadCredential",
            ApiError::RateLimitExceeded { .. } => "RateLimitExceeded",
            ApiError::Store(_) | ApiError::Migration(_) => "StoreFailure",
            ApiError::Token(_) | ApiError::Io(_) | ApiError::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadCredential => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated(_) | ApiError::InvalidCredential => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound | ApiError::NotFoundOrRevoked | ApiError::NotFoundOrNotRevoked => {
                StatusCode::NOT_FOUND
            }
            ApiError::DuplicateLogin(_) => StatusCode::CONFLICT,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Store(_)
            | ApiError::Migration(_)
            | ApiError::Token(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: invalid value", field),
                })
            })
            .collect();
        messages.sort();
        ApiError::Validation(messages.join("; "))
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}

/// Convert ApiError to HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if self.is_internal() {
            tracing::error!(error = %self, kind = self.kind(), "request failed");
            "An internal error occurred".to_string() // Don't leak details
        } else {
            tracing::debug!(error = %self, kind = self.kind(), "request rejected");
            self.to_string()
        };

        let retry_after = match &self {
            ApiError::RateLimitExceeded { retry_after } => Some(retry_after.as_secs().max(1)),
            _ => None,
        };

        let body = Json(ErrorResponse {
            success: false,
            error: self.kind().to_string(),
            message,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Result type alias for service operations
pub type ApiResult<T> = Result<T, ApiError>;
