//! Periodic maintenance sweeps
//!
//! Expires abandoned pending payments and rolls subscription periods whose
//! boundary has passed without a gateway-driven update.

use sqlx::PgPool;
use std::sync::OnceLock;
use time::{Duration, OffsetDateTime};
use tracing::{error, info};

use userlab_billing::BillingFacade;

const ROLLOVER_BATCH_SIZE: i64 = 50;

static PENDING_EXPIRY_HOURS: OnceLock<i64> = OnceLock::new();

/// How long a payment may sit in `pending` before the sweep cancels it
fn pending_expiry_hours() -> i64 {
    *PENDING_EXPIRY_HOURS.get_or_init(|| {
        std::env::var("PENDING_PAYMENT_EXPIRY_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(24)
    })
}

/// Cancel pending payments that never settled
pub async fn sweep_stale_pending(pool: &PgPool) {
    let facade = BillingFacade::new(pool.clone());
    let cutoff = OffsetDateTime::now_utc() - Duration::hours(pending_expiry_hours());

    if let Err(e) = facade.ledger().expire_stale_pending(cutoff).await {
        error!(error = %e, "Pending payment sweep failed");
    }
}

/// Advance subscriptions whose billing period has ended. Subscriptions
/// marked `cancel_at_period_end` lapse instead of rolling.
pub async fn sweep_period_rollover(pool: &PgPool) {
    let facade = BillingFacade::new(pool.clone());
    let now = OffsetDateTime::now_utc();

    let due = match facade
        .subscriptions()
        .due_for_rollover(now, ROLLOVER_BATCH_SIZE)
        .await
    {
        Ok(subscriptions) => subscriptions,
        Err(e) => {
            error!(error = %e, "Failed to fetch subscriptions due for rollover");
            return;
        }
    };

    if due.is_empty() {
        return;
    }

    info!(count = due.len(), "Rolling ended subscription periods");

    for subscription in due {
        if let Err(e) = facade.subscriptions().roll_period(&subscription).await {
            error!(
                subscription_id = %subscription.id,
                error = %e,
                "Failed to roll subscription period"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_expiry_default() {
        // Without the env var set, the sweep uses a 24 hour cutoff
        std::env::remove_var("PENDING_PAYMENT_EXPIRY_HOURS");
        assert_eq!(pending_expiry_hours(), 24);
    }
}
