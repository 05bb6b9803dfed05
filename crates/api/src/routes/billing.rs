//! Billing and entitlement endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use userlab_billing::{EntitlementSummary, NewManualPayment};
use userlab_shared::{Currency, LimitKind, Payment, PaymentMethod, PlanTier, RetryHistoryEntry};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SubmitManualPaymentRequest {
    pub user_id: Uuid,
    pub plan_type: PlanTier,
    pub amount_cents: i64,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub payment_proof: Option<String>,
    pub bank_details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ManualPaymentResponse {
    pub id: Uuid,
    pub reference_number: String,
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub admin_id: Uuid,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub admin_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct FraudFlagRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct FraudReviewRequest {
    pub admin_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub id: Uuid,
    pub status: String,
    pub amount_cents: i64,
    pub currency: String,
    pub retry_attempts: i32,
    pub retry_history: Vec<RetryHistoryEntry>,
    pub risk_level: String,
    pub fraud_flagged: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub attempted_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<OffsetDateTime>,
}

impl From<Payment> for PaymentView {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            retry_history: p.retry_history_parsed(),
            status: p.status,
            amount_cents: p.amount_cents,
            currency: p.currency,
            retry_attempts: p.retry_attempts,
            risk_level: p.risk_level,
            fraud_flagged: p.fraud_flagged,
            attempted_at: p.attempted_at,
            paid_at: p.paid_at,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /billing/entitlements/:user_id
pub async fn get_entitlements(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<EntitlementSummary>> {
    let summary = state.billing.entitlement_summary(user_id).await?;
    Ok(Json(summary))
}

/// GET /billing/limits/:user_id/:kind
pub async fn get_limit(
    State(state): State<AppState>,
    Path((user_id, kind)): Path<(Uuid, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    let kind: LimitKind = kind
        .parse()
        .map_err(|e: String| ApiError::BadRequest(e))?;

    let check = state.billing.check_limit_for_user(user_id, kind).await?;
    Ok(Json(json!({
        "limit_kind": kind,
        "allowed": check.allowed,
        "remaining": check.remaining,
        "percentage": check.percentage,
    })))
}

/// GET /billing/payments/:user_id
pub async fn list_payments(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PaymentView>>> {
    let payments = state.billing.ledger().list_for_user(user_id, 100).await?;
    Ok(Json(payments.into_iter().map(PaymentView::from).collect()))
}

/// POST /billing/manual-payments
pub async fn submit_manual_payment(
    State(state): State<AppState>,
    Json(req): Json<SubmitManualPaymentRequest>,
) -> ApiResult<Json<ManualPaymentResponse>> {
    let request = state
        .billing
        .manual()
        .submit(NewManualPayment {
            user_id: req.user_id,
            plan_type: req.plan_type,
            amount_cents: req.amount_cents,
            currency: req.currency,
            payment_method: req.payment_method,
            payment_proof: req.payment_proof,
            bank_details: req.bank_details,
        })
        .await?;

    Ok(Json(ManualPaymentResponse {
        id: request.id,
        reference_number: request.reference_number,
        status: request.status,
        amount_cents: request.amount_cents,
        currency: request.currency,
    }))
}

/// POST /admin/manual-payments/:id/verify
pub async fn verify_manual_payment(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let account = state
        .billing
        .manual()
        .verify(request_id, req.admin_id, req.admin_notes.as_deref())
        .await?;

    Ok(Json(json!({
        "request_id": request_id,
        "credit_account_id": account.id,
        "total_credits": account.total_credits,
        "available_credits": account.available_credits,
    })))
}

/// POST /admin/manual-payments/:id/reject
pub async fn reject_manual_payment(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if req.reason.trim().is_empty() {
        return Err(ApiError::Validation(
            "rejection reason must not be empty".to_string(),
        ));
    }

    let request = state
        .billing
        .manual()
        .reject(request_id, req.admin_id, &req.reason)
        .await?;

    Ok(Json(json!({
        "request_id": request.id,
        "status": request.status,
        "rejection_reason": request.rejection_reason,
    })))
}

/// POST /admin/payments/:id/fraud/flag
pub async fn flag_payment_fraud(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<FraudFlagRequest>,
) -> ApiResult<Json<PaymentView>> {
    if req.reason.trim().is_empty() {
        return Err(ApiError::Validation(
            "fraud flag reason must not be empty".to_string(),
        ));
    }

    let payment = state.billing.risk().flag_for_fraud(payment_id, &req.reason).await?;
    Ok(Json(PaymentView::from(payment)))
}

/// POST /admin/payments/:id/fraud/approve
pub async fn approve_fraud_review(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<FraudReviewRequest>,
) -> ApiResult<Json<PaymentView>> {
    let payment = state
        .billing
        .risk()
        .approve_after_review(payment_id, req.admin_id)
        .await?;
    Ok(Json(PaymentView::from(payment)))
}

/// POST /admin/payments/:id/fraud/decline
pub async fn decline_fraud_review(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<FraudReviewRequest>,
) -> ApiResult<Json<PaymentView>> {
    let payment = state
        .billing
        .risk()
        .decline_after_review(payment_id, req.admin_id)
        .await?;
    Ok(Json(PaymentView::from(payment)))
}
