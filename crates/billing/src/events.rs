//! Billing Events Module
//!
//! Append-only billing event logging for audit trails and debugging. Events
//! capture every mutation the engine performs and can be used to:
//! - Answer "why is this user on this plan?" questions
//! - Reconstruct a payment's retry and review history
//! - Compliance and audit requirements

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Types of billing events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingEventType {
    // Payment lifecycle
    PaymentCreated,
    PaymentSucceeded,
    PaymentFailed,
    PaymentRefunded,
    PaymentExpired,

    // Retry machinery
    RetryScheduled,
    RetriesExhausted,

    // Fraud review
    FraudFlagged,
    FraudApproved,
    FraudDeclined,

    // Subscription lifecycle
    SubscriptionActivated,
    SubscriptionCanceled,
    SubscriptionReactivated,
    PlanChanged,
    PeriodRolled,
    SubscriptionPastDue,
    SubscriptionUnpaid,

    // Manual credit path
    ManualPaymentSubmitted,
    ManualPaymentVerified,
    ManualPaymentRejected,
    CreditsAdded,
    CreditsUsed,
}

impl std::fmt::Display for BillingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingEventType::PaymentCreated => "PAYMENT_CREATED",
            BillingEventType::PaymentSucceeded => "PAYMENT_SUCCEEDED",
            BillingEventType::PaymentFailed => "PAYMENT_FAILED",
            BillingEventType::PaymentRefunded => "PAYMENT_REFUNDED",
            BillingEventType::PaymentExpired => "PAYMENT_EXPIRED",
            BillingEventType::RetryScheduled => "RETRY_SCHEDULED",
            BillingEventType::RetriesExhausted => "RETRIES_EXHAUSTED",
            BillingEventType::FraudFlagged => "FRAUD_FLAGGED",
            BillingEventType::FraudApproved => "FRAUD_APPROVED",
            BillingEventType::FraudDeclined => "FRAUD_DECLINED",
            BillingEventType::SubscriptionActivated => "SUBSCRIPTION_ACTIVATED",
            BillingEventType::SubscriptionCanceled => "SUBSCRIPTION_CANCELED",
            BillingEventType::SubscriptionReactivated => "SUBSCRIPTION_REACTIVATED",
            BillingEventType::PlanChanged => "PLAN_CHANGED",
            BillingEventType::PeriodRolled => "PERIOD_ROLLED",
            BillingEventType::SubscriptionPastDue => "SUBSCRIPTION_PAST_DUE",
            BillingEventType::SubscriptionUnpaid => "SUBSCRIPTION_UNPAID",
            BillingEventType::ManualPaymentSubmitted => "MANUAL_PAYMENT_SUBMITTED",
            BillingEventType::ManualPaymentVerified => "MANUAL_PAYMENT_VERIFIED",
            BillingEventType::ManualPaymentRejected => "MANUAL_PAYMENT_REJECTED",
            BillingEventType::CreditsAdded => "CREDITS_ADDED",
            BillingEventType::CreditsUsed => "CREDITS_USED",
        };
        write!(f, "{}", s)
    }
}

/// Who triggered the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    /// End user through the application
    User,
    /// Admin user
    Admin,
    /// System automation (workers, sweeps)
    System,
    /// Payment gateway webhook
    Gateway,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::User => write!(f, "user"),
            ActorType::Admin => write!(f, "admin"),
            ActorType::System => write!(f, "system"),
            ActorType::Gateway => write!(f, "gateway"),
        }
    }
}

/// A billing event record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BillingEvent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub payment_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub gateway_event_id: Option<String>,
    pub actor_id: Option<Uuid>,
    pub actor_type: String,
    pub created_at: OffsetDateTime,
}

/// Builder for creating billing events
pub struct BillingEventBuilder {
    user_id: Uuid,
    event_type: BillingEventType,
    event_data: serde_json::Value,
    payment_id: Option<Uuid>,
    subscription_id: Option<Uuid>,
    gateway_event_id: Option<String>,
    actor_id: Option<Uuid>,
    actor_type: ActorType,
}

impl BillingEventBuilder {
    pub fn new(user_id: Uuid, event_type: BillingEventType) -> Self {
        Self {
            user_id,
            event_type,
            event_data: serde_json::json!({}),
            payment_id: None,
            subscription_id: None,
            gateway_event_id: None,
            actor_id: None,
            actor_type: ActorType::System,
        }
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.event_data = data;
        self
    }

    pub fn payment(mut self, payment_id: Uuid) -> Self {
        self.payment_id = Some(payment_id);
        self
    }

    pub fn subscription(mut self, subscription_id: Uuid) -> Self {
        self.subscription_id = Some(subscription_id);
        self
    }

    pub fn gateway_event(mut self, event_id: impl Into<String>) -> Self {
        self.gateway_event_id = Some(event_id.into());
        self
    }

    pub fn actor(mut self, actor_id: Uuid, actor_type: ActorType) -> Self {
        self.actor_id = Some(actor_id);
        self.actor_type = actor_type;
        self
    }

    pub fn actor_type(mut self, actor_type: ActorType) -> Self {
        self.actor_type = actor_type;
        self
    }
}

/// Service for logging and querying billing events
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Log a billing event
    pub async fn log_event(&self, builder: BillingEventBuilder) -> BillingResult<Uuid> {
        let event_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO billing_events (
                user_id,
                event_type,
                event_data,
                payment_id,
                subscription_id,
                gateway_event_id,
                actor_id,
                actor_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(builder.user_id)
        .bind(builder.event_type.to_string())
        .bind(&builder.event_data)
        .bind(builder.payment_id)
        .bind(builder.subscription_id)
        .bind(&builder.gateway_event_id)
        .bind(builder.actor_id)
        .bind(builder.actor_type.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(event_id.0)
    }

    /// Get recent events for a user
    pub async fn get_events_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<BillingEvent>> {
        let events: Vec<BillingEvent> = sqlx::query_as(
            r#"
            SELECT id, user_id, event_type, event_data, payment_id, subscription_id,
                   gateway_event_id, actor_id, actor_type, created_at
            FROM billing_events
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Get events for a specific payment (the retry/review audit trail)
    pub async fn get_events_for_payment(
        &self,
        payment_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<BillingEvent>> {
        let events: Vec<BillingEvent> = sqlx::query_as(
            r#"
            SELECT id, user_id, event_type, event_data, payment_id, subscription_id,
                   gateway_event_id, actor_id, actor_type, created_at
            FROM billing_events
            WHERE payment_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(payment_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_billing_event_type_display() {
        assert_eq!(
            BillingEventType::PaymentSucceeded.to_string(),
            "PAYMENT_SUCCEEDED"
        );
        assert_eq!(
            BillingEventType::RetriesExhausted.to_string(),
            "RETRIES_EXHAUSTED"
        );
        assert_eq!(
            BillingEventType::ManualPaymentVerified.to_string(),
            "MANUAL_PAYMENT_VERIFIED"
        );
    }

    #[test]
    fn test_actor_type_display() {
        assert_eq!(ActorType::User.to_string(), "user");
        assert_eq!(ActorType::Admin.to_string(), "admin");
        assert_eq!(ActorType::System.to_string(), "system");
        assert_eq!(ActorType::Gateway.to_string(), "gateway");
    }

    #[test]
    fn test_event_builder() {
        let user_id = Uuid::new_v4();
        let payment_id = Uuid::new_v4();
        let builder = BillingEventBuilder::new(user_id, BillingEventType::PaymentFailed)
            .data(serde_json::json!({"failure_code": "card_declined"}))
            .payment(payment_id)
            .gateway_event("evt_123")
            .actor_type(ActorType::Gateway);

        assert_eq!(builder.user_id, user_id);
        assert_eq!(builder.event_type, BillingEventType::PaymentFailed);
        assert_eq!(builder.payment_id, Some(payment_id));
        assert_eq!(builder.gateway_event_id, Some("evt_123".to_string()));
        assert_eq!(builder.actor_type, ActorType::Gateway);
    }
}
