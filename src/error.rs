//! Error taxonomy and the public-response sanitizer
//!
//! Every fallible route and admin action funnels its failure through
//! [`AppError::sanitize`] before anything is written to a response body.
//! Internal detail (sqlx/reqwest messages, query fragments) only ever
//! reaches the server log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input. The message is safe by construction
    /// (built from fixed text, never from internal state).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Not authenticated, or the caller is no longer an admin in the
    /// system of record.
    #[error("not authorized")]
    Unauthorized,

    /// Target resource absent. Carries only the resource noun.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Underlying persistence failure.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A collaborator (WAF, geolocation, identity provider) was
    /// unreachable or returned garbage.
    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Sanitized, serializable error shape returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct PublicError {
    pub error: &'static str,
    pub message: String,
    /// Operator correlation code; matches the server-side log line.
    pub code: &'static str,
    #[serde(skip)]
    pub status: StatusCode,
}

const GENERIC_MESSAGE: &str = "Something went wrong. Please try again later.";

impl AppError {
    /// Map an error to the fixed public vocabulary. `code` identifies the
    /// call site in server logs; the full error is logged here, once.
    pub fn sanitize(&self, code: &'static str) -> PublicError {
        match self {
            AppError::Validation(msg) => PublicError {
                error: "validation_error",
                message: msg.clone(),
                code,
                status: StatusCode::BAD_REQUEST,
            },
            AppError::Unauthorized => PublicError {
                error: "unauthorized",
                message: "Not authorized".to_string(),
                code,
                status: StatusCode::FORBIDDEN,
            },
            AppError::NotFound(what) => PublicError {
                error: "not_found",
                message: format!("{what} not found"),
                code,
                status: StatusCode::NOT_FOUND,
            },
            AppError::Storage(e) => {
                tracing::error!(code, error = %e, "storage failure");
                PublicError {
                    error: "internal_error",
                    message: GENERIC_MESSAGE.to_string(),
                    code,
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                }
            }
            AppError::Upstream(e) => {
                tracing::error!(code, error = %e, "upstream failure");
                PublicError {
                    error: "internal_error",
                    message: GENERIC_MESSAGE.to_string(),
                    code,
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                }
            }
        }
    }
}

impl IntoResponse for PublicError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}
