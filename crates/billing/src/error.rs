//! Billing error types

use thiserror::Error;

/// Billing-specific errors
///
/// Business-rule failures (insufficient credits, already-processed requests,
/// exceeded limits) are expected control flow and carry enough data for the
/// caller to react without string matching. Validation failures are rejected
/// before any write.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient credits: {requested} requested, {available} available")]
    InsufficientCredits { requested: i64, available: i64 },

    #[error("Request already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Usage limit exceeded for {limit_kind}: {current}/{limit}")]
    LimitExceeded {
        limit_kind: String,
        current: i64,
        limit: i64,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Concurrent modification detected: {0}")]
    ConcurrentModification(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        BillingError::Gateway(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
