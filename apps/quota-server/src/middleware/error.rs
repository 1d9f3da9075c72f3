//! Error handling middleware - RFC 7807 compliant responses.

use actix_web::http::header::RETRY_AFTER;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use quota_core::PolicyError;
use quota_shared::ErrorResponse;
use std::fmt;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    TooManyRequests { retry_after_secs: u64 },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::TooManyRequests { retry_after_secs } => {
                write!(f, "Too many requests, retry in {}s", retry_after_secs)
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if let AppError::TooManyRequests { retry_after_secs } = self {
            builder.insert_header((RETRY_AFTER, retry_after_secs.to_string()));
        }
        builder.json(self.problem())
    }
}

impl AppError {
    /// Problem details body for this error, without a request ID.
    pub fn problem(&self) -> ErrorResponse {
        match self {
            AppError::NotFound(detail) => ErrorResponse::not_found(detail),
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::TooManyRequests { retry_after_secs } => {
                ErrorResponse::too_many_requests(*retry_after_secs)
            }
        }
    }
}

impl From<PolicyError> for AppError {
    fn from(err: PolicyError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;
