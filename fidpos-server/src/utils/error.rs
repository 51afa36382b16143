//! Unified error handling
//!
//! Application-level error type and response envelope:
//! - [`AppError`] - error enum for the HTTP boundary
//! - [`AppResponse`] - API response envelope
//!
//! # Error codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | OK | success |
//! | EMPTY_CART | checkout called with no cart lines |
//! | NOTHING_FULFILLABLE | no cart line could be fulfilled |
//! | PERSISTENCE_FAILURE | transaction commit failed (stock compensated) |
//! | GATEWAY_AUTH_FAILURE | payment provider credential failure |
//! | GATEWAY_UNREACHABLE | payment provider network failure |
//! | GATEWAY_REJECTED | payment provider rejected the initiation |
//! | NOT_FOUND / CONFLICT / VALIDATION_ERROR | generic 4xx |
//! | DATABASE_ERROR / INTERNAL_ERROR | generic 5xx |

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use crate::checkout::CheckoutError;
use crate::db::repository::RepoError;
use crate::payment::GatewayError;

/// API response envelope
///
/// ```json
/// {
///   "code": "OK",
///   "message": "success",
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct AppResponse<T> {
    /// Stable code string ("OK" on success)
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Response payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> AppResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: "OK".to_string(),
            message: "success".to_string(),
            data: Some(data),
        }
    }
}

/// Application error enum
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ========== Business errors (4xx) ==========
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("No cart line could be fulfilled")]
    NothingFulfillable,

    // ========== Gateway errors (502) ==========
    #[error("Gateway authentication failed: {0}")]
    GatewayAuth(String),

    #[error("Gateway unreachable: {0}")]
    GatewayUnreachable(String),

    #[error("Gateway rejected request: {0}")]
    GatewayRejected(String),

    // ========== System errors (5xx) ==========
    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction could not be persisted: {0}")]
    Persistence(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        AppError::Database(msg.into())
    }

    /// Stable code string for this error
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::EmptyCart => "EMPTY_CART",
            AppError::NothingFulfillable => "NOTHING_FULFILLABLE",
            AppError::GatewayAuth(_) => "GATEWAY_AUTH_FAILURE",
            AppError::GatewayUnreachable(_) => "GATEWAY_UNREACHABLE",
            AppError::GatewayRejected(_) => "GATEWAY_REJECTED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Persistence(_) => "PERSISTENCE_FAILURE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) | AppError::EmptyCart => StatusCode::BAD_REQUEST,
            AppError::NothingFulfillable => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::GatewayAuth(_)
            | AppError::GatewayUnreachable(_)
            | AppError::GatewayRejected(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Persistence(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Don't leak storage internals to clients
            AppError::Database(detail) | AppError::Internal(detail) => {
                error!(code = self.code(), detail = %detail, "Internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = AppResponse::<()> {
            code: self.code().to_string(),
            message,
            data: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => AppError::NotFound(msg),
            RepoError::Duplicate(msg) => AppError::Conflict(msg),
            RepoError::Validation(msg) => AppError::Validation(msg),
            RepoError::Database(msg) => AppError::Database(msg),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::EmptyCart => AppError::EmptyCart,
            CheckoutError::NothingFulfillable => AppError::NothingFulfillable,
            CheckoutError::Persistence(msg) => AppError::Persistence(msg),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Auth(msg) => AppError::GatewayAuth(msg),
            GatewayError::Unreachable(msg) => AppError::GatewayUnreachable(msg),
            GatewayError::Rejected(msg) => AppError::GatewayRejected(msg),
        }
    }
}

/// Result alias for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;
