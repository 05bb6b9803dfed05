//! Billing facade
//!
//! The single entry point the rest of the platform calls: entitlement
//! questions ("can this user add a participant?") and the webhook dispatch
//! that moves payment and subscription state. Routes between the two billing
//! paths: a live subscription wins, otherwise the credit account answers.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use userlab_shared::{LimitKind, PlanTier, RiskLevel, SubscriptionStatus, UNLIMITED};

use crate::error::{BillingError, BillingResult};
use crate::gateway::GatewayEvent;
use crate::ledger::PaymentLedger;
use crate::manual::ManualCreditWorkflow;
use crate::retry::RetryScheduler;
use crate::risk::RiskScorer;
use crate::subscription::SubscriptionLifecycle;
use crate::usage::{check_limit, LimitCheck, UsageMeter};

/// Entitlement snapshot for a user, for dashboards and the limits endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EntitlementSummary {
    pub plan: PlanTier,
    /// Billing path answering for this user
    pub source: EntitlementSource,
    /// Consumed percentage per limit kind; unlimited kinds report 0
    pub usage_percentages: Vec<(LimitKind, i64)>,
    /// Days until the period (subscription) or plan (credits) ends
    pub days_remaining: Option<i64>,
    pub is_trial_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementSource {
    Subscription,
    Credits,
    None,
}

/// Top-level billing service wiring the engine's parts together
#[derive(Clone)]
pub struct BillingFacade {
    pool: PgPool,
    ledger: PaymentLedger,
    retries: RetryScheduler,
    subscriptions: SubscriptionLifecycle,
    manual: ManualCreditWorkflow,
    usage: UsageMeter,
    risk: RiskScorer,
}

impl BillingFacade {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: PaymentLedger::new(pool.clone()),
            retries: RetryScheduler::new(pool.clone()),
            subscriptions: SubscriptionLifecycle::new(pool.clone()),
            manual: ManualCreditWorkflow::new(pool.clone()),
            usage: UsageMeter::new(pool.clone()),
            risk: RiskScorer::new(pool.clone()),
            pool,
        }
    }

    pub fn ledger(&self) -> &PaymentLedger {
        &self.ledger
    }

    pub fn subscriptions(&self) -> &SubscriptionLifecycle {
        &self.subscriptions
    }

    pub fn manual(&self) -> &ManualCreditWorkflow {
        &self.manual
    }

    pub fn usage(&self) -> &UsageMeter {
        &self.usage
    }

    pub fn retries(&self) -> &RetryScheduler {
        &self.retries
    }

    pub fn risk(&self) -> &RiskScorer {
        &self.risk
    }

    /// Limit check for one action. A trialing/active/past_due subscription
    /// answers from its usage snapshot; otherwise an unexpired credit account
    /// answers from its feature limits; no billing at all means denied.
    pub async fn check_limit_for_user(
        &self,
        user_id: Uuid,
        kind: LimitKind,
    ) -> BillingResult<LimitCheck> {
        if let Some(subscription) = self.subscriptions.entitled_for_user(user_id).await? {
            return Ok(self.usage.check(&subscription, kind));
        }

        let now = OffsetDateTime::now_utc();
        if let Some(account) = self.manual.get_account(user_id).await? {
            if account.is_active && !account.is_expired(now) {
                let features = account.features_parsed();
                let limit = match kind {
                    LimitKind::Studies => features.max_studies,
                    LimitKind::Participants => features.max_participants,
                    // Credit accounts only meter the study workload
                    _ => UNLIMITED,
                };
                // Credit-path consumption is the credit spend itself; limits
                // here gate scale, not a metered counter
                return Ok(check_limit(limit, 0));
            }
        }

        Ok(LimitCheck {
            allowed: false,
            remaining: 0,
            percentage: 0,
        })
    }

    pub async fn can_perform(&self, user_id: Uuid, kind: LimitKind) -> BillingResult<bool> {
        Ok(self.check_limit_for_user(user_id, kind).await?.allowed)
    }

    /// Entitlement summary for dashboards
    pub async fn entitlement_summary(&self, user_id: Uuid) -> BillingResult<EntitlementSummary> {
        let now = OffsetDateTime::now_utc();

        if let Some(subscription) = self.subscriptions.entitled_for_user(user_id).await? {
            let limits = subscription.limits();
            let usage = subscription.usage();
            let usage_percentages = LimitKind::ALL
                .iter()
                .map(|&kind| {
                    (
                        kind,
                        check_limit(limits.get(kind), usage.get(kind)).percentage,
                    )
                })
                .collect();

            let days_remaining = (subscription.current_period_end - now).whole_days().max(0);
            return Ok(EntitlementSummary {
                plan: subscription.plan_parsed(),
                source: EntitlementSource::Subscription,
                usage_percentages,
                days_remaining: Some(days_remaining),
                is_trial_active: subscription.is_trial_active(now),
            });
        }

        if let Some(account) = self.manual.get_account(user_id).await? {
            if account.is_active && !account.is_expired(now) {
                let days_remaining = account
                    .plan_end_date
                    .map(|end| (end - now).whole_days().max(0));
                return Ok(EntitlementSummary {
                    plan: account.plan_parsed(),
                    source: EntitlementSource::Credits,
                    usage_percentages: Vec::new(),
                    days_remaining,
                    is_trial_active: false,
                });
            }
        }

        Ok(EntitlementSummary {
            plan: PlanTier::Free,
            source: EntitlementSource::None,
            usage_percentages: Vec::new(),
            days_remaining: None,
            is_trial_active: false,
        })
    }

    /// A charge settled. Idempotent on the charge id; a replayed success is
    /// absorbed without double-applying the net amount. A linked subscription
    /// recovers to active. A critical gateway risk score puts the payment
    /// under fraud review without touching its settled status.
    pub async fn record_success(
        &self,
        gateway_intent_id: &str,
        charge_id: &str,
        amount_received_cents: i64,
        gateway_fee_cents: i64,
        application_fee_cents: i64,
        risk_score: Option<i16>,
    ) -> BillingResult<()> {
        let payment = self
            .ledger
            .mark_succeeded(
                gateway_intent_id,
                charge_id,
                amount_received_cents,
                gateway_fee_cents,
                application_fee_cents,
            )
            .await?;

        if let Some(score) = risk_score {
            let payment = self.risk.set_risk_score(payment.id, score).await?;
            if RiskLevel::from_score(score) == RiskLevel::Critical && !payment.fraud_flagged {
                self.risk
                    .flag_for_fraud(payment.id, "critical gateway risk score")
                    .await?;
            }
        }

        if let Some(subscription_id) = payment.subscription_id {
            self.subscriptions.mark_active(subscription_id).await?;
        }

        Ok(())
    }

    /// A charge failed. The retry scheduler applies the transition; while
    /// retries remain a linked subscription goes past_due, and once they run
    /// out it goes unpaid.
    pub async fn record_failure(
        &self,
        gateway_intent_id: &str,
        failure_code: &str,
        failure_message: &str,
    ) -> BillingResult<()> {
        let payment = self
            .retries
            .on_payment_failed(gateway_intent_id, failure_code, failure_message)
            .await?;

        if let Some(subscription_id) = payment.subscription_id {
            if payment.next_retry_at.is_some() {
                self.subscriptions.mark_past_due(subscription_id).await?;
            } else {
                self.subscriptions.mark_unpaid(subscription_id).await?;
            }
        }

        Ok(())
    }

    /// A refund landed. Cumulative refunds are capped at the received amount
    /// in the ledger; a full refund cancels a linked subscription immediately.
    pub async fn record_refund(
        &self,
        gateway_intent_id: &str,
        refund_amount_cents: i64,
        reason: Option<&str>,
    ) -> BillingResult<()> {
        let payment = self
            .ledger
            .process_refund(gateway_intent_id, refund_amount_cents, reason)
            .await?;

        if payment.status == "refunded" {
            if let Some(subscription_id) = payment.subscription_id {
                match self
                    .subscriptions
                    .cancel(subscription_id, Some("payment refunded"), true)
                    .await
                {
                    Ok(_) => {}
                    // Already canceled or unpaid; the refund still stands
                    Err(BillingError::InvalidTransition { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }

    /// Dispatch a normalized gateway event. Delivery is at-least-once, so
    /// the event id is claimed in `gateway_events` first; a replay finds the
    /// claim and is absorbed as success without touching state. A claim only
    /// survives successful processing: when the dispatch errors the claim is
    /// released again, so the gateway's redelivery is processed instead of
    /// absorbed.
    pub async fn handle_gateway_event(&self, event: GatewayEvent) -> BillingResult<()> {
        let event_id = event.event_id().to_string();

        let claimed: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO gateway_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            RETURNING event_id
            "#,
        )
        .bind(&event_id)
        .bind(event_type_name(&event))
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            tracing::info!(event_id = %event_id, "Replayed gateway event absorbed");
            return Ok(());
        }

        let result = self.dispatch_gateway_event(event).await;

        if let Err(e) = &result {
            match sqlx::query("DELETE FROM gateway_events WHERE event_id = $1")
                .bind(&event_id)
                .execute(&self.pool)
                .await
            {
                Ok(_) => tracing::warn!(
                    event_id = %event_id,
                    error = %e,
                    "Gateway event failed, claim released for redelivery"
                ),
                Err(release_err) => tracing::error!(
                    event_id = %event_id,
                    error = %release_err,
                    "Failed to release claim for failed gateway event"
                ),
            }
        }

        result
    }

    async fn dispatch_gateway_event(&self, event: GatewayEvent) -> BillingResult<()> {
        match event {
            GatewayEvent::ChargeSucceeded {
                payment_intent_id,
                charge_id,
                amount_received_cents,
                gateway_fee_cents,
                application_fee_cents,
                risk_score,
                ..
            } => {
                self.record_success(
                    &payment_intent_id,
                    &charge_id,
                    amount_received_cents,
                    gateway_fee_cents,
                    application_fee_cents,
                    risk_score,
                )
                .await
            }
            GatewayEvent::ChargeFailed {
                payment_intent_id,
                failure_code,
                failure_message,
                ..
            } => {
                self.record_failure(&payment_intent_id, &failure_code, &failure_message)
                    .await
            }
            GatewayEvent::ChargeRefunded {
                payment_intent_id,
                refund_amount_cents,
                reason,
                ..
            } => {
                self.record_refund(&payment_intent_id, refund_amount_cents, reason.as_deref())
                    .await
            }
            GatewayEvent::SubscriptionUpdated {
                subscription_id,
                status,
                current_period_start,
                current_period_end,
                ..
            } => {
                let status: SubscriptionStatus = status
                    .parse()
                    .map_err(BillingError::Validation)?;
                self.subscriptions
                    .apply_period_update(
                        &subscription_id,
                        status,
                        current_period_start,
                        current_period_end,
                    )
                    .await?;
                Ok(())
            }
        }
    }
}

fn event_type_name(event: &GatewayEvent) -> &'static str {
    match event {
        GatewayEvent::ChargeSucceeded { .. } => "charge.succeeded",
        GatewayEvent::ChargeFailed { .. } => "charge.failed",
        GatewayEvent::ChargeRefunded { .. } => "charge.refunded",
        GatewayEvent::SubscriptionUpdated { .. } => "subscription.updated",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names_match_wire_tags() {
        let event = GatewayEvent::ChargeRefunded {
            event_id: "evt_1".to_string(),
            payment_intent_id: "pi_1".to_string(),
            refund_amount_cents: 500,
            reason: None,
        };
        assert_eq!(event_type_name(&event), "charge.refunded");
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_failed_event_is_not_absorbed_on_redelivery() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = userlab_shared::db::create_pool(&url)
            .await
            .expect("Failed to create pool");
        let facade = BillingFacade::new(pool);

        // No payment exists for this intent, so processing errors
        let event = GatewayEvent::ChargeFailed {
            event_id: format!("evt_{}", Uuid::new_v4()),
            payment_intent_id: format!("pi_missing_{}", Uuid::new_v4()),
            failure_code: "card_declined".to_string(),
            failure_message: "Card declined".to_string(),
        };

        assert!(facade.handle_gateway_event(event.clone()).await.is_err());
        // The claim was released, so the redelivery fails the same way
        // instead of being absorbed as a replay
        assert!(facade.handle_gateway_event(event).await.is_err());
    }

    #[test]
    fn test_summary_serializes_for_api() {
        let summary = EntitlementSummary {
            plan: PlanTier::Pro,
            source: EntitlementSource::Subscription,
            usage_percentages: vec![(LimitKind::Studies, 40)],
            days_remaining: Some(12),
            is_trial_active: false,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["plan"], "pro");
        assert_eq!(value["source"], "subscription");
        assert_eq!(value["days_remaining"], 12);
    }
}
