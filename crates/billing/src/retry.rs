//! Failed-payment retry scheduling
//!
//! Applies the failure transition, keeps the ordered retry history, and
//! schedules the next attempt with exponential backoff. The queue is drained
//! by the worker; the claim step is guarded on the attempt count so two
//! scheduler instances can never both charge the same attempt.

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use userlab_shared::Payment;

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

/// Backoff delay after a failure has bumped `retry_attempts` to `attempts`.
/// Returns `None` once the attempt budget is spent: the payment is
/// terminal-failed and needs manual follow-up.
pub fn backoff_after(attempts: i32, max_attempts: i32) -> Option<Duration> {
    if attempts < max_attempts {
        Some(Duration::hours(1i64 << attempts))
    } else {
        None
    }
}

/// Retry scheduling service
#[derive(Clone)]
pub struct RetryScheduler {
    pool: PgPool,
    events: BillingEventLogger,
}

impl RetryScheduler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: BillingEventLogger::new(pool.clone()),
            pool,
        }
    }

    /// Apply a failure to a payment: status -> `failed`, `failed_at` stamped
    /// once, history entry appended, attempt counter bumped, and the next
    /// retry scheduled (or left unset when the budget is spent). All in one
    /// statement so concurrent deliveries cannot interleave partial state.
    pub async fn on_payment_failed(
        &self,
        gateway_intent_id: &str,
        failure_code: &str,
        failure_message: &str,
    ) -> BillingResult<Payment> {
        let payment: Option<Payment> = sqlx::query_as(
            r#"
            UPDATE payments SET
                status = 'failed',
                failed_at = COALESCE(failed_at, NOW()),
                failure_code = $2,
                failure_message = $3,
                retry_history = retry_history || jsonb_build_object(
                    'attempt', retry_attempts + 1,
                    'attempted_at', to_char(NOW() AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS"Z"'),
                    'status', 'failed',
                    'failure_reason', $3::TEXT
                ),
                retry_attempts = retry_attempts + 1,
                next_retry_at = CASE
                    WHEN retry_attempts + 1 < max_retry_attempts
                        THEN NOW() + make_interval(hours => (2 ^ (retry_attempts + 1))::INT)
                    ELSE NULL
                END,
                updated_at = NOW()
            WHERE gateway_intent_id = $1
              AND status IN ('pending', 'processing', 'failed')
            RETURNING *
            "#,
        )
        .bind(gateway_intent_id)
        .bind(failure_code)
        .bind(failure_message)
        .fetch_optional(&self.pool)
        .await?;

        let payment = payment.ok_or_else(|| {
            BillingError::NotFound(format!("Retryable payment intent {}", gateway_intent_id))
        })?;

        if let Some(next_retry_at) = payment.next_retry_at {
            self.events
                .log_event(
                    BillingEventBuilder::new(payment.user_id, BillingEventType::RetryScheduled)
                        .payment(payment.id)
                        .data(serde_json::json!({
                            "attempt": payment.retry_attempts,
                            "failure_code": failure_code,
                            "next_retry_at": next_retry_at.to_string(),
                        }))
                        .actor_type(ActorType::Gateway),
                )
                .await?;
            tracing::info!(
                payment_id = %payment.id,
                attempt = payment.retry_attempts,
                next_retry_at = %next_retry_at,
                "Payment failed, retry scheduled"
            );
        } else {
            self.events
                .log_event(
                    BillingEventBuilder::new(payment.user_id, BillingEventType::RetriesExhausted)
                        .payment(payment.id)
                        .data(serde_json::json!({
                            "attempts": payment.retry_attempts,
                            "failure_code": failure_code,
                        }))
                        .actor_type(ActorType::Gateway),
                )
                .await?;
            tracing::error!(
                payment_id = %payment.id,
                attempts = payment.retry_attempts,
                failure_code,
                "Payment permanently failed after max retries"
            );
        }

        Ok(payment)
    }

    /// The retry queue: failed payments with budget left whose backoff has
    /// elapsed. This is a plain snapshot read; two worker ticks may both see
    /// a row, and `claim_for_retry` is what keeps them from both charging it.
    pub async fn retryable_payments(
        &self,
        now: OffsetDateTime,
        limit: i64,
    ) -> BillingResult<Vec<Payment>> {
        let payments: Vec<Payment> = sqlx::query_as(
            r#"
            SELECT * FROM payments
            WHERE status = 'failed'
              AND retry_attempts < max_retry_attempts
              AND next_retry_at IS NOT NULL
              AND next_retry_at <= $1
            ORDER BY next_retry_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Claim a payment for one retry attempt. The guard on `retry_attempts`
    /// is the idempotency key (payment id + attempts at dequeue time): if
    /// another worker already claimed or the attempt count moved, the claim
    /// fails and the caller must skip the row instead of charging twice.
    pub async fn claim_for_retry(
        &self,
        payment_id: Uuid,
        observed_attempts: i32,
    ) -> BillingResult<Payment> {
        let claimed: Option<Payment> = sqlx::query_as(
            r#"
            UPDATE payments SET
                status = 'processing',
                updated_at = NOW()
            WHERE id = $1
              AND status = 'failed'
              AND retry_attempts = $2
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(observed_attempts)
        .fetch_optional(&self.pool)
        .await?;

        claimed.ok_or_else(|| {
            BillingError::ConcurrentModification(format!(
                "payment {} already claimed or advanced past attempt {}",
                payment_id, observed_attempts
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        // First failure: retry in 2h; second: 4h; third hits the default cap
        assert_eq!(backoff_after(1, 3), Some(Duration::hours(2)));
        assert_eq!(backoff_after(2, 3), Some(Duration::hours(4)));
        assert_eq!(backoff_after(3, 3), None);
    }

    #[test]
    fn test_backoff_is_strictly_increasing() {
        let mut last = Duration::ZERO;
        for attempts in 1..5 {
            if let Some(delay) = backoff_after(attempts, 6) {
                assert!(delay > last);
                last = delay;
            }
        }
    }

    #[test]
    fn test_backoff_with_larger_budget() {
        assert_eq!(backoff_after(3, 5), Some(Duration::hours(8)));
        assert_eq!(backoff_after(4, 5), Some(Duration::hours(16)));
        assert_eq!(backoff_after(5, 5), None);
    }

    #[test]
    fn test_backoff_exhausted_never_reschedules() {
        assert_eq!(backoff_after(4, 3), None);
        assert_eq!(backoff_after(100, 3), None);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_claim_is_exactly_once_per_attempt() {
        use crate::ledger::{NewPayment, PaymentLedger};

        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = userlab_shared::db::create_pool(&url)
            .await
            .expect("Failed to create pool");
        let ledger = PaymentLedger::new(pool.clone());
        let retries = RetryScheduler::new(pool);

        let intent = format!("pi_{}", Uuid::new_v4());
        ledger
            .create_payment(NewPayment {
                user_id: Uuid::new_v4(),
                subscription_id: None,
                gateway_intent_id: Some(intent.clone()),
                gateway_customer_id: None,
                amount_cents: 10_000,
                currency: "USD".to_string(),
                risk_score: None,
            })
            .await
            .expect("create");

        let failed = retries
            .on_payment_failed(&intent, "card_declined", "Card declined")
            .await
            .expect("fail");
        assert_eq!(failed.retry_attempts, 1);

        let claimed = retries.claim_for_retry(failed.id, 1).await.expect("claim");
        assert_eq!(claimed.status, "processing");

        // The same observed attempt cannot be claimed twice
        let second = retries.claim_for_retry(failed.id, 1).await;
        assert!(matches!(
            second,
            Err(BillingError::ConcurrentModification(_))
        ));
    }
}
