//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use userlab_billing::BillingError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Request errors
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Invalid webhook signature")]
    InvalidSignature,

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    // Billing errors
    #[error("Usage limit exceeded")]
    UsageLimitExceeded,
    #[error("Insufficient credits")]
    InsufficientCredits,
    #[error("Payment required")]
    PaymentRequired,

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE", self.to_string())
            }

            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::AlreadyProcessed(msg) => {
                (StatusCode::CONFLICT, "ALREADY_PROCESSED", msg.clone())
            }

            ApiError::UsageLimitExceeded => {
                (StatusCode::PAYMENT_REQUIRED, "USAGE_LIMIT_EXCEEDED", self.to_string())
            }
            ApiError::InsufficientCredits => {
                (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_CREDITS", self.to_string())
            }
            ApiError::PaymentRequired => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REQUIRED", self.to_string())
            }

            ApiError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Database error".to_string(),
            ),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "API error");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation(msg) | BillingError::InvalidAmount(msg) => {
                ApiError::Validation(msg)
            }
            BillingError::NotFound(_) => ApiError::NotFound,
            BillingError::AlreadyProcessed(msg) => ApiError::AlreadyProcessed(msg),
            BillingError::InsufficientCredits { .. } => ApiError::InsufficientCredits,
            BillingError::LimitExceeded { .. } => ApiError::UsageLimitExceeded,
            BillingError::InvalidTransition { from, to } => {
                ApiError::BadRequest(format!("invalid transition from {} to {}", from, to))
            }
            BillingError::Database(e) => ApiError::Database(e.to_string()),
            _ => ApiError::Internal,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(err.to_string())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_error_mapping() {
        let err: ApiError = BillingError::InsufficientCredits {
            requested: 100,
            available: 20,
        }
        .into();
        assert!(matches!(err, ApiError::InsufficientCredits));

        let err: ApiError = BillingError::AlreadyProcessed("request x".to_string()).into();
        assert!(matches!(err, ApiError::AlreadyProcessed(_)));
    }
}
