//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use credit_ledger_core::LedgerError;
use credit_ledger_store::StoreError;

use crate::metering::MeteringError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - the ledger kept changing underneath the request.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient credits.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Credits remaining across both buckets.
        available: f64,
        /// Credits the request needed.
        required: f64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientCredits {
                available,
                required,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "available": available,
                    "required": required
                })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                Self::NotFound(format!("{entity} not found: {id}"))
            }
            StoreError::AlreadyExists { .. } | StoreError::VersionConflict { .. } => {
                Self::Conflict(err.to_string())
            }
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCredits {
                available,
                required,
            } => Self::InsufficientCredits {
                available,
                required,
            },
            // A model without a price is a deployment problem, not a client one.
            LedgerError::PricingMissing { .. } => Self::Internal(err.to_string()),
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidTier(_)
            | LedgerError::InvalidId(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<MeteringError> for ApiError {
    fn from(err: MeteringError) -> Self {
        match err {
            MeteringError::Ledger(e) => e.into(),
            MeteringError::Store(e) => e.into(),
            MeteringError::AccountNotFound(user_id) => {
                Self::NotFound(format!("account not found: {user_id}"))
            }
            MeteringError::RetriesExhausted { .. } => Self::Conflict(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credit_ledger_core::{Modality, UserId};

    #[test]
    fn insufficient_credits_is_payment_required() {
        let err: ApiError = LedgerError::InsufficientCredits {
            available: 0.5,
            required: 2.0,
        }
        .into();
        assert_eq!(err.into_response().status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn missing_price_is_internal() {
        let err: ApiError = LedgerError::PricingMissing {
            model: "mystery".into(),
            modality: Modality::Text,
        }
        .into();
        assert!(matches!(err, ApiError::Internal(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn invalid_amount_is_bad_request() {
        let err: ApiError = LedgerError::InvalidAmount("-1".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn metering_errors_map_to_status() {
        let err: ApiError = MeteringError::AccountNotFound(UserId::generate()).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let err: ApiError = MeteringError::RetriesExhausted { attempts: 5 }.into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
