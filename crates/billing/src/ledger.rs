//! Payment ledger
//!
//! Owns creation and terminal transitions of Payment records. Payments are
//! audit records: they are created on every charge attempt and never deleted.
//! Derived fields (`net_amount_cents`, `risk_level`) are recomputed inside the
//! same statement that writes their inputs, so a partially-applied update can
//! never leave them stale.

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use userlab_shared::{Payment, PaymentStatus, RiskLevel};

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

/// Parameters for a new payment attempt
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub gateway_intent_id: Option<String>,
    pub gateway_customer_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub risk_score: Option<i16>,
}

/// Derived net amount once funds have been received
pub fn net_amount_cents(received: i64, gateway_fee: i64, application_fee: i64) -> i64 {
    received - gateway_fee - application_fee
}

/// Ledger-entity validation. Invariant violations here are caller bugs and
/// are rejected before any write.
pub fn validate_new_payment(params: &NewPayment) -> BillingResult<()> {
    if params.amount_cents < 0 {
        return Err(BillingError::InvalidAmount(format!(
            "amount_cents must be >= 0, got {}",
            params.amount_cents
        )));
    }
    if let Some(score) = params.risk_score {
        if !(0..=100).contains(&score) {
            return Err(BillingError::Validation(format!(
                "risk_score must be 0-100, got {}",
                score
            )));
        }
    }
    if params.currency.is_empty() {
        return Err(BillingError::Validation("currency is required".to_string()));
    }
    Ok(())
}

/// Payment ledger service
#[derive(Clone)]
pub struct PaymentLedger {
    pool: PgPool,
    events: BillingEventLogger,
}

impl PaymentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: BillingEventLogger::new(pool.clone()),
            pool,
        }
    }

    /// Record a new payment attempt (status `pending`)
    pub async fn create_payment(&self, params: NewPayment) -> BillingResult<Payment> {
        validate_new_payment(&params)?;

        let risk_level = params
            .risk_score
            .map(RiskLevel::from_score)
            .unwrap_or(RiskLevel::Low);

        let payment: Payment = sqlx::query_as(
            r#"
            INSERT INTO payments (
                user_id, subscription_id, gateway_intent_id, gateway_customer_id,
                amount_cents, currency, status, attempted_at, risk_score, risk_level
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', NOW(), $7, $8)
            RETURNING *
            "#,
        )
        .bind(params.user_id)
        .bind(params.subscription_id)
        .bind(&params.gateway_intent_id)
        .bind(&params.gateway_customer_id)
        .bind(params.amount_cents)
        .bind(&params.currency)
        .bind(params.risk_score)
        .bind(risk_level.to_string())
        .fetch_one(&self.pool)
        .await?;

        self.events
            .log_event(
                BillingEventBuilder::new(payment.user_id, BillingEventType::PaymentCreated)
                    .payment(payment.id)
                    .data(serde_json::json!({
                        "amount_cents": payment.amount_cents,
                        "currency": payment.currency,
                    })),
            )
            .await?;

        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> BillingResult<Payment> {
        let payment: Option<Payment> = sqlx::query_as("SELECT * FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;

        payment.ok_or_else(|| BillingError::NotFound(format!("Payment {}", payment_id)))
    }

    pub async fn get_by_intent(&self, gateway_intent_id: &str) -> BillingResult<Payment> {
        let payment: Option<Payment> =
            sqlx::query_as("SELECT * FROM payments WHERE gateway_intent_id = $1")
                .bind(gateway_intent_id)
                .fetch_optional(&self.pool)
                .await?;

        payment
            .ok_or_else(|| BillingError::NotFound(format!("Payment intent {}", gateway_intent_id)))
    }

    /// List a user's payments, newest first (audit view)
    pub async fn list_for_user(&self, user_id: Uuid, limit: i64) -> BillingResult<Vec<Payment>> {
        let payments: Vec<Payment> = sqlx::query_as(
            "SELECT * FROM payments WHERE user_id = $1 ORDER BY attempted_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Mark a payment succeeded. Idempotent on the gateway charge id: a
    /// replayed webhook finds the payment already succeeded with the same
    /// charge id and is absorbed without re-applying amounts.
    pub async fn mark_succeeded(
        &self,
        gateway_intent_id: &str,
        charge_id: &str,
        amount_received_cents: i64,
        gateway_fee_cents: i64,
        application_fee_cents: i64,
    ) -> BillingResult<Payment> {
        if amount_received_cents < 0 {
            return Err(BillingError::InvalidAmount(format!(
                "amount_received_cents must be >= 0, got {}",
                amount_received_cents
            )));
        }

        let net = net_amount_cents(
            amount_received_cents,
            gateway_fee_cents,
            application_fee_cents,
        );

        // Single conditional UPDATE: only a non-terminal payment transitions,
        // and paid_at is set exactly once.
        let updated: Option<Payment> = sqlx::query_as(
            r#"
            UPDATE payments SET
                status = 'succeeded',
                gateway_charge_id = $2,
                amount_received_cents = $3,
                gateway_fee_cents = $4,
                application_fee_cents = $5,
                net_amount_cents = $6,
                paid_at = NOW(),
                next_retry_at = NULL,
                updated_at = NOW()
            WHERE gateway_intent_id = $1
              AND status IN ('pending', 'processing', 'failed')
            RETURNING *
            "#,
        )
        .bind(gateway_intent_id)
        .bind(charge_id)
        .bind(amount_received_cents)
        .bind(gateway_fee_cents)
        .bind(application_fee_cents)
        .bind(net)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(payment) = updated {
            self.events
                .log_event(
                    BillingEventBuilder::new(payment.user_id, BillingEventType::PaymentSucceeded)
                        .payment(payment.id)
                        .data(serde_json::json!({
                            "charge_id": charge_id,
                            "amount_received_cents": amount_received_cents,
                            "net_amount_cents": net,
                        }))
                        .actor_type(ActorType::Gateway),
                )
                .await?;
            return Ok(payment);
        }

        // No transition happened: either a replay (absorb) or a bad call
        let existing = self.get_by_intent(gateway_intent_id).await?;
        if existing.status_parsed() == PaymentStatus::Succeeded
            && existing.gateway_charge_id.as_deref() == Some(charge_id)
        {
            tracing::info!(
                gateway_intent_id,
                charge_id,
                "Replayed charge.succeeded absorbed"
            );
            return Ok(existing);
        }

        Err(BillingError::InvalidTransition {
            from: existing.status,
            to: "succeeded".to_string(),
        })
    }

    /// Apply a refund. Cumulative refunds are capped at the amount received;
    /// a full refund flips the payment to `refunded` and stamps
    /// `refunded_at` exactly once.
    pub async fn process_refund(
        &self,
        gateway_intent_id: &str,
        refund_amount_cents: i64,
        reason: Option<&str>,
    ) -> BillingResult<Payment> {
        if refund_amount_cents <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "refund_amount_cents must be > 0, got {}",
                refund_amount_cents
            )));
        }

        let updated: Option<Payment> = sqlx::query_as(
            r#"
            UPDATE payments SET
                refund_amount_cents = refund_amount_cents + $2,
                status = CASE
                    WHEN refund_amount_cents + $2 >= amount_received_cents THEN 'refunded'
                    ELSE status
                END,
                refunded_at = CASE
                    WHEN refund_amount_cents + $2 >= amount_received_cents
                        THEN COALESCE(refunded_at, NOW())
                    ELSE refunded_at
                END,
                updated_at = NOW()
            WHERE gateway_intent_id = $1
              AND status IN ('succeeded', 'refunded')
              AND refund_amount_cents + $2 <= amount_received_cents
            RETURNING *
            "#,
        )
        .bind(gateway_intent_id)
        .bind(refund_amount_cents)
        .fetch_optional(&self.pool)
        .await?;

        let payment = match updated {
            Some(p) => p,
            None => {
                let existing = self.get_by_intent(gateway_intent_id).await?;
                if existing.refund_amount_cents + refund_amount_cents
                    > existing.amount_received_cents
                {
                    return Err(BillingError::InvalidAmount(format!(
                        "refund of {} exceeds refundable {} on payment {}",
                        refund_amount_cents,
                        existing.amount_received_cents - existing.refund_amount_cents,
                        existing.id
                    )));
                }
                return Err(BillingError::InvalidTransition {
                    from: existing.status,
                    to: "refunded".to_string(),
                });
            }
        };

        self.events
            .log_event(
                BillingEventBuilder::new(payment.user_id, BillingEventType::PaymentRefunded)
                    .payment(payment.id)
                    .data(serde_json::json!({
                        "refund_amount_cents": refund_amount_cents,
                        "cumulative_refund_cents": payment.refund_amount_cents,
                        "reason": reason,
                    }))
                    .actor_type(ActorType::Gateway),
            )
            .await?;

        Ok(payment)
    }

    /// Cancel `pending` payments older than the threshold. Run by the worker
    /// sweep so a lost gateway response cannot strand a payment in `pending`.
    pub async fn expire_stale_pending(&self, older_than: OffsetDateTime) -> BillingResult<u64> {
        let expired: Vec<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            UPDATE payments SET
                status = 'canceled',
                updated_at = NOW()
            WHERE status = 'pending'
              AND attempted_at < $1
            RETURNING id, user_id
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;

        let count = expired.len() as u64;
        for (payment_id, user_id) in expired {
            self.events
                .log_event(
                    BillingEventBuilder::new(user_id, BillingEventType::PaymentExpired)
                        .payment(payment_id),
                )
                .await?;
        }

        if count > 0 {
            tracing::info!(expired = count, "Expired stale pending payments");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_payment() -> NewPayment {
        NewPayment {
            user_id: Uuid::new_v4(),
            subscription_id: None,
            gateway_intent_id: Some("pi_1".to_string()),
            gateway_customer_id: None,
            amount_cents: 10_000,
            currency: "USD".to_string(),
            risk_score: None,
        }
    }

    #[test]
    fn test_net_amount_derivation() {
        assert_eq!(net_amount_cents(10_000, 320, 100), 9_580);
        assert_eq!(net_amount_cents(0, 0, 0), 0);
    }

    #[test]
    fn test_validate_rejects_negative_amount() {
        let params = NewPayment {
            amount_cents: -1,
            ..new_payment()
        };
        assert!(matches!(
            validate_new_payment(&params),
            Err(BillingError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_risk_score() {
        let params = NewPayment {
            risk_score: Some(101),
            ..new_payment()
        };
        assert!(matches!(
            validate_new_payment(&params),
            Err(BillingError::Validation(_))
        ));

        let ok = NewPayment {
            risk_score: Some(100),
            ..new_payment()
        };
        assert!(validate_new_payment(&ok).is_ok());
    }

    #[test]
    fn test_validate_requires_currency() {
        let params = NewPayment {
            currency: String::new(),
            ..new_payment()
        };
        assert!(matches!(
            validate_new_payment(&params),
            Err(BillingError::Validation(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_mark_succeeded_replay_is_absorbed_once() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = userlab_shared::db::create_pool(&url)
            .await
            .expect("Failed to create pool");
        let ledger = PaymentLedger::new(pool);

        let intent = format!("pi_{}", Uuid::new_v4());
        ledger
            .create_payment(NewPayment {
                gateway_intent_id: Some(intent.clone()),
                ..new_payment()
            })
            .await
            .expect("create");

        let first = ledger
            .mark_succeeded(&intent, "ch_replay", 10_000, 320, 100)
            .await
            .expect("first settle");
        assert_eq!(first.status, "succeeded");
        assert_eq!(first.net_amount_cents, 9_580);

        // Same charge id again: absorbed, amounts and paid_at untouched
        let replay = ledger
            .mark_succeeded(&intent, "ch_replay", 10_000, 320, 100)
            .await
            .expect("replay");
        assert_eq!(replay.amount_received_cents, 10_000);
        assert_eq!(replay.net_amount_cents, 9_580);
        assert_eq!(replay.paid_at, first.paid_at);

        // A different charge id for the same intent is a bad call, not a replay
        let conflicting = ledger.mark_succeeded(&intent, "ch_other", 10_000, 320, 100).await;
        assert!(matches!(
            conflicting,
            Err(BillingError::InvalidTransition { .. })
        ));
    }
}
