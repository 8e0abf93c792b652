//! Engine error taxonomy
//!
//! Four classes matter to callers: validation failures and state conflicts
//! (the caller's fault, 4xx), storage failures (ours, 5xx), and notarization
//! failures, which are never surfaced through the primary operation at all
//! and live in `notary::NotaryError`. Handlers return `EngineError`
//! directly; the `IntoResponse` impl keeps the wire mapping in one place.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("amount must be a non-zero integer")]
    InvalidAmount,

    #[error("insufficient points: balance {balance}, required {required}")]
    InsufficientPoints { balance: i64, required: i64 },

    #[error("reward item not found or not redeemable")]
    ItemNotFound,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("request already settled as {status}")]
    TerminalState { status: String },

    #[error("transition {from} -> {to} is not allowed")]
    InvalidTransition { from: String, to: String },

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::InvalidAmount | EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::ItemNotFound | EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::InsufficientPoints { .. }
            | EngineError::TerminalState { .. }
            | EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
            EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
            EngineError::Storage(_) | EngineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Storage details stay in the logs, not on the wire.
        let body = if status.is_server_error() {
            error!(error = %self, "Request failed");
            json!({ "error": "internal error" })
        } else {
            json!({ "error": self.to_string() })
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_map_to_400() {
        assert_eq!(
            EngineError::InvalidAmount.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::Validation("missing reason".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_state_errors_map_to_409() {
        assert_eq!(
            EngineError::InsufficientPoints {
                balance: 10,
                required: 60
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngineError::TerminalState {
                status: "rejected".to_string()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngineError::InvalidTransition {
                from: "ready".to_string(),
                to: "pending".to_string()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_lookup_and_permission_errors() {
        assert_eq!(
            EngineError::ItemNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EngineError::NotFound("user").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EngineError::Forbidden("not the owner").status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_storage_errors_map_to_500() {
        assert_eq!(
            EngineError::Storage(sqlx::Error::PoolClosed).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            EngineError::Internal("bad row".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_insufficient_points_message_is_actionable() {
        let err = EngineError::InsufficientPoints {
            balance: 40,
            required: 60,
        };
        let msg = err.to_string();
        assert!(msg.contains("40"));
        assert!(msg.contains("60"));
    }
}
