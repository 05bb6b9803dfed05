//! API routes

pub mod billing;
pub mod health;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let webhook_routes = Router::new().route("/webhooks/gateway", post(webhooks::gateway_webhook));

    let billing_routes = Router::new()
        .route("/billing/entitlements/:user_id", get(billing::get_entitlements))
        .route("/billing/limits/:user_id/:kind", get(billing::get_limit))
        .route("/billing/payments/:user_id", get(billing::list_payments))
        .route("/billing/manual-payments", post(billing::submit_manual_payment));

    let admin_routes = Router::new()
        .route(
            "/admin/manual-payments/:id/verify",
            post(billing::verify_manual_payment),
        )
        .route(
            "/admin/manual-payments/:id/reject",
            post(billing::reject_manual_payment),
        )
        .route(
            "/admin/payments/:id/fraud/flag",
            post(billing::flag_payment_fraud),
        )
        .route(
            "/admin/payments/:id/fraud/approve",
            post(billing::approve_fraud_review),
        )
        .route(
            "/admin/payments/:id/fraud/decline",
            post(billing::decline_fraud_review),
        );

    Router::new()
        .merge(health_routes)
        .merge(webhook_routes)
        .merge(billing_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
