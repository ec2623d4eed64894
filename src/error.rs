//! Error types shared by the lookup modules and the HTTP layer.
//!
//! Lookup functions return [`LookupError`], which separates bad input and
//! missing records from store failures. The HTTP layer turns every error
//! into [`ApiError`], rendered with the standard envelope:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "verse not found: 2:300" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `not_found` | 404 |
//! | `upstream_error` | 502 |
//! | `ai_unavailable` | 503 |
//! | `internal` | 500 |

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::ai::AiError;
use crate::models::{PersonError, VerseKeyError};
use crate::rules::RuleError;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type LookupResult<T> = Result<T, LookupError>;

impl LookupError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        LookupError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        LookupError::NotFound(message.into())
    }
}

impl From<VerseKeyError> for LookupError {
    fn from(e: VerseKeyError) -> Self {
        LookupError::BadRequest(e.to_string())
    }
}

impl From<PersonError> for LookupError {
    fn from(e: PersonError) -> Self {
        LookupError::BadRequest(e.to_string())
    }
}

// ============ HTTP error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// An error rendered as a JSON HTTP response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

pub fn not_found(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

pub fn upstream_error(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream_error",
        message: message.into(),
    }
}

pub fn ai_unavailable(message: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "ai_unavailable",
        message: message.into(),
    }
}

/// Store failures are logged in full but reported generically.
pub fn internal(err: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %err, "internal error");
    ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: "internal server error".to_string(),
    }
}

impl From<LookupError> for ApiError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::BadRequest(m) => bad_request(m),
            LookupError::NotFound(m) => not_found(m),
            LookupError::Database(err) => internal(err),
        }
    }
}

impl From<VerseKeyError> for ApiError {
    fn from(e: VerseKeyError) -> Self {
        bad_request(e.to_string())
    }
}

impl From<RuleError> for ApiError {
    fn from(e: RuleError) -> Self {
        if e.is_input_error() {
            bad_request(e.to_string())
        } else {
            internal(e)
        }
    }
}

impl From<AiError> for ApiError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::NotConfigured(_) => ai_unavailable(e.to_string()),
            AiError::InvalidInput(_) => bad_request(e.to_string()),
            AiError::Lookup(inner) => inner.into(),
            AiError::Upstream { .. } | AiError::Transport(_) | AiError::Decode(_) => {
                tracing::warn!(error = %e, "upstream call failed");
                upstream_error(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_errors_map_to_status_codes() {
        let e: ApiError = LookupError::bad_request("q too short").into();
        assert_eq!(e.status, StatusCode::BAD_REQUEST);
        assert_eq!(e.code, "bad_request");

        let e: ApiError = LookupError::not_found("verse not found: 2:300").into();
        assert_eq!(e.status, StatusCode::NOT_FOUND);
        assert_eq!(e.message, "verse not found: 2:300");
    }

    #[test]
    fn ai_errors_map_to_gateway_codes() {
        let e: ApiError = AiError::NotConfigured("chat").into();
        assert_eq!(e.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(e.code, "ai_unavailable");

        let e: ApiError = AiError::Upstream {
            service: "qdrant",
            status: 500,
            body: "boom".to_string(),
        }
        .into();
        assert_eq!(e.status, StatusCode::BAD_GATEWAY);
        assert_eq!(e.code, "upstream_error");
    }
}
