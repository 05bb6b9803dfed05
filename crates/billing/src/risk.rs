//! Risk scoring and fraud review
//!
//! Buckets gateway risk signals into coarse levels and manages the fraud
//! review hold. Flagging is a hold, not a transition: a flagged payment keeps
//! its lifecycle status and must not be treated as succeeded or failed until
//! an admin resolves the review.

use sqlx::PgPool;
use uuid::Uuid;

use userlab_shared::{FraudReviewStatus, Payment, RiskLevel};

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

/// Risk scoring service
#[derive(Clone)]
pub struct RiskScorer {
    pool: PgPool,
    events: BillingEventLogger,
}

impl RiskScorer {
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: BillingEventLogger::new(pool.clone()),
            pool,
        }
    }

    /// Write a gateway risk score; the derived level is recomputed in the
    /// same statement so score and level can never disagree.
    pub async fn set_risk_score(&self, payment_id: Uuid, score: i16) -> BillingResult<Payment> {
        if !(0..=100).contains(&score) {
            return Err(BillingError::Validation(format!(
                "risk_score must be 0-100, got {}",
                score
            )));
        }

        let level = RiskLevel::from_score(score);
        let payment: Option<Payment> = sqlx::query_as(
            r#"
            UPDATE payments SET
                risk_score = $2,
                risk_level = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(score)
        .bind(level.to_string())
        .fetch_optional(&self.pool)
        .await?;

        payment.ok_or_else(|| BillingError::NotFound(format!("Payment {}", payment_id)))
    }

    /// Place a payment under fraud review. Escalates the risk level to at
    /// least `high`; leaves the payment status untouched.
    pub async fn flag_for_fraud(&self, payment_id: Uuid, reason: &str) -> BillingResult<Payment> {
        let payment: Option<Payment> = sqlx::query_as(
            r#"
            UPDATE payments SET
                fraud_flagged = TRUE,
                fraud_review_status = 'pending',
                risk_level = CASE
                    WHEN risk_level IN ('high', 'critical') THEN risk_level
                    ELSE 'high'
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        let payment =
            payment.ok_or_else(|| BillingError::NotFound(format!("Payment {}", payment_id)))?;

        self.events
            .log_event(
                BillingEventBuilder::new(payment.user_id, BillingEventType::FraudFlagged)
                    .payment(payment.id)
                    .data(serde_json::json!({
                        "reason": reason,
                        "risk_level": payment.risk_level,
                    })),
            )
            .await?;

        tracing::warn!(payment_id = %payment_id, reason, "Payment flagged for fraud review");
        Ok(payment)
    }

    /// Resolve a pending review as approved. Clears the flag; does not
    /// retroactively change a terminal `failed`/`canceled` status.
    pub async fn approve_after_review(
        &self,
        payment_id: Uuid,
        admin_id: Uuid,
    ) -> BillingResult<Payment> {
        self.resolve_review(payment_id, admin_id, true).await
    }

    /// Resolve a pending review as declined. The flag stays set for audit.
    pub async fn decline_after_review(
        &self,
        payment_id: Uuid,
        admin_id: Uuid,
    ) -> BillingResult<Payment> {
        self.resolve_review(payment_id, admin_id, false).await
    }

    async fn resolve_review(
        &self,
        payment_id: Uuid,
        admin_id: Uuid,
        approved: bool,
    ) -> BillingResult<Payment> {
        let (new_status, clear_flag) = if approved {
            (FraudReviewStatus::Approved, true)
        } else {
            (FraudReviewStatus::Declined, false)
        };

        // Only a pending review can be resolved; resolving twice fails loudly
        let payment: Option<Payment> = sqlx::query_as(
            r#"
            UPDATE payments SET
                fraud_review_status = $2,
                fraud_flagged = CASE WHEN $3 THEN FALSE ELSE fraud_flagged END,
                updated_at = NOW()
            WHERE id = $1
              AND fraud_review_status = 'pending'
            RETURNING *
            "#,
        )
        .bind(payment_id)
        .bind(new_status.to_string())
        .bind(clear_flag)
        .fetch_optional(&self.pool)
        .await?;

        let payment = match payment {
            Some(p) => p,
            None => {
                // Distinguish missing payment from an already-resolved review
                let exists: Option<(String,)> = sqlx::query_as(
                    "SELECT COALESCE(fraud_review_status, 'none') FROM payments WHERE id = $1",
                )
                .bind(payment_id)
                .fetch_optional(&self.pool)
                .await?;

                return match exists {
                    Some((status,)) => Err(BillingError::AlreadyProcessed(format!(
                        "fraud review for payment {} is {}",
                        payment_id, status
                    ))),
                    None => Err(BillingError::NotFound(format!("Payment {}", payment_id))),
                };
            }
        };

        let event_type = if approved {
            BillingEventType::FraudApproved
        } else {
            BillingEventType::FraudDeclined
        };
        self.events
            .log_event(
                BillingEventBuilder::new(payment.user_id, event_type)
                    .payment(payment.id)
                    .actor(admin_id, ActorType::Admin),
            )
            .await?;

        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use userlab_shared::RiskLevel;

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(RiskLevel::from_score(85), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(45), RiskLevel::Medium);
        // Exact boundaries
        assert_eq!(RiskLevel::from_score(80), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(60), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(40), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(39), RiskLevel::Low);
    }

    #[test]
    fn test_escalation_floor_is_high() {
        // flag_for_fraud escalates low/medium to high but never downgrades
        for (level, expected) in [
            (RiskLevel::Low, RiskLevel::High),
            (RiskLevel::Medium, RiskLevel::High),
            (RiskLevel::High, RiskLevel::High),
            (RiskLevel::Critical, RiskLevel::Critical),
        ] {
            let escalated = if level >= RiskLevel::High {
                level
            } else {
                RiskLevel::High
            };
            assert_eq!(escalated, expected);
        }
    }
}
