//! Usage metering service
//!
//! Tracks per-period consumption against the subscription's limit snapshot
//! and answers "is this action allowed" / "how much remains".

use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use userlab_shared::{LimitKind, Subscription, UsageCounters, UNLIMITED};

use crate::error::{BillingError, BillingResult};

/// Result of a limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LimitCheck {
    pub allowed: bool,
    /// Remaining headroom; `-1` when the limit is unlimited
    pub remaining: i64,
    /// Percentage of the limit consumed, rounded; 0 for unlimited or zero limits
    pub percentage: i64,
}

/// Pure limit check. `UNLIMITED` (-1) always allows; a zero limit never does.
pub fn check_limit(limit: i64, current: i64) -> LimitCheck {
    if limit == UNLIMITED {
        return LimitCheck {
            allowed: true,
            remaining: UNLIMITED,
            percentage: 0,
        };
    }

    let remaining = (limit - current).max(0);
    let percentage = if limit == 0 {
        0
    } else {
        ((current as f64 / limit as f64) * 100.0).round() as i64
    };

    LimitCheck {
        allowed: current < limit,
        remaining,
        percentage,
    }
}

/// Usage metering service
#[derive(Clone)]
pub struct UsageMeter {
    pool: PgPool,
}

impl UsageMeter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check one limit against a subscription's snapshot and current counters
    pub fn check(&self, subscription: &Subscription, kind: LimitKind) -> LimitCheck {
        let limit = subscription.limits().get(kind);
        let current = subscription.usage().get(kind);
        check_limit(limit, current)
    }

    /// Add to a usage counter.
    ///
    /// Deliberately permissive: callers are expected to `check` first, and the
    /// meter does not block over-limit increments. Crossing the limit is
    /// logged so over-limit usage is visible without being enforced here.
    pub async fn increment_usage(
        &self,
        subscription_id: Uuid,
        kind: LimitKind,
        amount: i64,
    ) -> BillingResult<UsageCounters> {
        if amount < 0 {
            return Err(BillingError::InvalidAmount(format!(
                "usage increment must be >= 0, got {}",
                amount
            )));
        }

        let row: Option<(serde_json::Value, serde_json::Value)> = sqlx::query_as(
            r#"
            UPDATE subscriptions SET
                current_usage = jsonb_set(
                    current_usage,
                    ARRAY[$2],
                    to_jsonb(COALESCE((current_usage ->> $2)::BIGINT, 0) + $3)
                ),
                updated_at = NOW()
            WHERE id = $1
            RETURNING current_usage, usage_limits
            "#,
        )
        .bind(subscription_id)
        .bind(kind.to_string())
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        let (current_usage, usage_limits) = row.ok_or_else(|| {
            BillingError::NotFound(format!("Subscription {}", subscription_id))
        })?;

        let counters: UsageCounters = serde_json::from_value(current_usage).unwrap_or_default();
        let limit = usage_limits
            .get(kind.to_string())
            .and_then(|v| v.as_i64())
            .unwrap_or(UNLIMITED);
        let current = counters.get(kind);

        if limit != UNLIMITED && current > limit {
            tracing::warn!(
                subscription_id = %subscription_id,
                limit_kind = %kind,
                current,
                limit,
                "Usage counter exceeds plan limit"
            );
        }

        Ok(counters)
    }

    /// Archive the ended period's counters and zero them for the new period.
    ///
    /// Idempotent per period: the archive insert is keyed on
    /// `(subscription_id, period_start)` and the counters are only zeroed when
    /// that insert actually happened, so a replayed rollover cannot
    /// double-archive or wipe fresh counters.
    pub async fn reset_usage_period(
        &self,
        subscription_id: Uuid,
        ended_period_start: OffsetDateTime,
        ended_period_end: OffsetDateTime,
    ) -> BillingResult<bool> {
        let mut tx = self.pool.begin().await?;

        let archived: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO usage_periods (subscription_id, period_start, period_end, counters)
            SELECT id, $2, $3, current_usage
            FROM subscriptions
            WHERE id = $1
            ON CONFLICT (subscription_id, period_start) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(subscription_id)
        .bind(ended_period_start)
        .bind(ended_period_end)
        .fetch_optional(&mut *tx)
        .await?;

        if archived.is_none() {
            // Already rolled for this period
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE subscriptions SET
                current_usage = $2,
                last_reset_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(subscription_id)
        .bind(
            serde_json::to_value(UsageCounters::default())
                .map_err(|e| BillingError::Internal(e.to_string()))?,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription_id,
            period_start = %ended_period_start,
            "Archived usage period and reset counters"
        );
        Ok(true)
    }

    /// Archived periods for a subscription, newest first
    pub async fn usage_history(
        &self,
        subscription_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<userlab_shared::UsagePeriod>> {
        let periods: Vec<userlab_shared::UsagePeriod> = sqlx::query_as(
            r#"
            SELECT id, subscription_id, period_start, period_end, counters, archived_at
            FROM usage_periods
            WHERE subscription_id = $1
            ORDER BY period_start DESC
            LIMIT $2
            "#,
        )
        .bind(subscription_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(periods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_always_allows() {
        let check = check_limit(UNLIMITED, 0);
        assert!(check.allowed);
        assert_eq!(check.remaining, UNLIMITED);
        assert_eq!(check.percentage, 0);

        // Regardless of current usage
        let check = check_limit(UNLIMITED, 9_999_999);
        assert!(check.allowed);
        assert_eq!(check.remaining, UNLIMITED);
    }

    #[test]
    fn test_zero_limit_never_allows() {
        let check = check_limit(0, 0);
        assert!(!check.allowed);
        assert_eq!(check.remaining, 0);
        assert_eq!(check.percentage, 0);
    }

    #[test]
    fn test_one_below_limit_rounds_to_full_percentage() {
        // pro participants: 2499 of 2500 used
        let check = check_limit(2_500, 2_499);
        assert!(check.allowed);
        assert_eq!(check.remaining, 1);
        assert_eq!(check.percentage, 100);
    }

    #[test]
    fn test_at_limit_blocks() {
        let check = check_limit(2_500, 2_500);
        assert!(!check.allowed);
        assert_eq!(check.remaining, 0);
        assert_eq!(check.percentage, 100);
    }

    #[test]
    fn test_over_limit_floors_remaining() {
        let check = check_limit(10, 14);
        assert!(!check.allowed);
        assert_eq!(check.remaining, 0);
        assert_eq!(check.percentage, 140);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(check_limit(3, 1).percentage, 33);
        assert_eq!(check_limit(3, 2).percentage, 67);
        assert_eq!(check_limit(8, 1).percentage, 13);
    }
}
