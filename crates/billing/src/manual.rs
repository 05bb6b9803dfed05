//! Manual payment and credit accounts
//!
//! The bank-transfer billing path: users submit a payment request with proof,
//! an admin verifies or rejects it, and verification credits the user's
//! account. Verification is a one-way door guarded by a conditional UPDATE so
//! a request can never be credited twice.

use rand::Rng;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use userlab_shared::{
    available_credits, CreditAccount, CreditFeatures, CreditGrant, Currency,
    ManualPaymentRequest, PaymentMethod, PlanTier,
};

use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventLogger, BillingEventType};

const REFERENCE_SUFFIX_LEN: usize = 6;
const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a payment reference: `PAY-<unix-ts base36>-<6 random chars>`,
/// uppercase throughout. The timestamp keeps references roughly sortable;
/// the random suffix plus the unique index make them collision-safe.
pub fn generate_reference_number(now: OffsetDateTime) -> String {
    let mut ts = now.unix_timestamp().max(0) as u64;
    let mut base36 = Vec::new();
    loop {
        base36.push(REFERENCE_ALPHABET[(ts % 36) as usize]);
        ts /= 36;
        if ts == 0 {
            break;
        }
    }
    base36.reverse();

    let mut rng = rand::thread_rng();
    let suffix: String = (0..REFERENCE_SUFFIX_LEN)
        .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
        .collect();

    format!("PAY-{}-{}", String::from_utf8_lossy(&base36), suffix)
}

/// Credits granted for a verified payment: one credit per whole currency unit
pub fn credits_for_amount(amount_cents: i64) -> i64 {
    amount_cents / 100
}

/// Parameters for submitting a manual payment request
#[derive(Debug, Clone)]
pub struct NewManualPayment {
    pub user_id: Uuid,
    pub plan_type: PlanTier,
    pub amount_cents: i64,
    pub currency: Currency,
    pub payment_method: PaymentMethod,
    pub payment_proof: Option<String>,
    pub bank_details: Option<serde_json::Value>,
}

/// Manual payment verification and credit account service
#[derive(Clone)]
pub struct ManualCreditWorkflow {
    pool: PgPool,
    events: BillingEventLogger,
}

impl ManualCreditWorkflow {
    pub fn new(pool: PgPool) -> Self {
        Self {
            events: BillingEventLogger::new(pool.clone()),
            pool,
        }
    }

    /// Submit a payment request; returns the pending record with its
    /// reference number for the user's bank transfer.
    pub async fn submit(&self, params: NewManualPayment) -> BillingResult<ManualPaymentRequest> {
        if params.amount_cents <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "manual payment amount must be > 0, got {}",
                params.amount_cents
            )));
        }

        let reference = generate_reference_number(OffsetDateTime::now_utc());

        let request: ManualPaymentRequest = sqlx::query_as(
            r#"
            INSERT INTO manual_payment_requests (
                user_id, plan_type, amount_cents, currency, payment_method,
                payment_proof, reference_number, status, bank_details
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8)
            RETURNING *
            "#,
        )
        .bind(params.user_id)
        .bind(params.plan_type.to_string())
        .bind(params.amount_cents)
        .bind(params.currency.to_string())
        .bind(params.payment_method.to_string())
        .bind(&params.payment_proof)
        .bind(&reference)
        .bind(&params.bank_details)
        .fetch_one(&self.pool)
        .await?;

        self.events
            .log_event(
                BillingEventBuilder::new(params.user_id, BillingEventType::ManualPaymentSubmitted)
                    .data(serde_json::json!({
                        "request_id": request.id,
                        "reference_number": reference,
                        "amount_cents": params.amount_cents,
                        "currency": params.currency.to_string(),
                    }))
                    .actor(params.user_id, ActorType::User),
            )
            .await?;

        tracing::info!(
            request_id = %request.id,
            user_id = %params.user_id,
            reference_number = %request.reference_number,
            "Manual payment request submitted"
        );
        Ok(request)
    }

    pub async fn get_request(&self, request_id: Uuid) -> BillingResult<ManualPaymentRequest> {
        let request: Option<ManualPaymentRequest> =
            sqlx::query_as("SELECT * FROM manual_payment_requests WHERE id = $1")
                .bind(request_id)
                .fetch_optional(&self.pool)
                .await?;

        request.ok_or_else(|| BillingError::NotFound(format!("Manual payment {}", request_id)))
    }

    /// Requests awaiting review, oldest first
    pub async fn pending_requests(&self, limit: i64) -> BillingResult<Vec<ManualPaymentRequest>> {
        let requests: Vec<ManualPaymentRequest> = sqlx::query_as(
            r#"
            SELECT * FROM manual_payment_requests
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(requests)
    }

    /// Verify a pending request and credit the user's account, atomically.
    ///
    /// The `pending -> verified` transition and the credit grant share one
    /// transaction; a request that is not pending fails loudly with
    /// `AlreadyProcessed` so a double-click or replay can never re-credit.
    pub async fn verify(
        &self,
        request_id: Uuid,
        admin_id: Uuid,
        admin_notes: Option<&str>,
    ) -> BillingResult<CreditAccount> {
        let mut tx = self.pool.begin().await?;

        let request: Option<ManualPaymentRequest> = sqlx::query_as(
            r#"
            UPDATE manual_payment_requests SET
                status = 'verified',
                verified_at = NOW(),
                verified_by = $2,
                admin_notes = COALESCE($3, admin_notes),
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(admin_id)
        .bind(admin_notes)
        .fetch_optional(&mut *tx)
        .await?;

        let request = match request {
            Some(r) => r,
            None => {
                tx.rollback().await?;
                let existing = self.get_request(request_id).await?;
                return Err(BillingError::AlreadyProcessed(format!(
                    "manual payment {} is already {}",
                    request_id, existing.status
                )));
            }
        };

        let credits = credits_for_amount(request.amount_cents);
        let plan = request.plan_type.parse().unwrap_or_default();
        let account = self
            .add_credits_tx(&mut tx, request.user_id, plan, credits, request.id, admin_id)
            .await?;

        tx.commit().await?;

        self.events
            .log_event(
                BillingEventBuilder::new(request.user_id, BillingEventType::ManualPaymentVerified)
                    .data(serde_json::json!({
                        "request_id": request.id,
                        "reference_number": request.reference_number,
                        "credits_added": credits,
                    }))
                    .actor(admin_id, ActorType::Admin),
            )
            .await?;

        tracing::info!(
            request_id = %request_id,
            user_id = %request.user_id,
            credits,
            "Manual payment verified and credited"
        );
        Ok(account)
    }

    /// Reject a pending request with a reason. Same one-way guard as verify.
    pub async fn reject(
        &self,
        request_id: Uuid,
        admin_id: Uuid,
        reason: &str,
    ) -> BillingResult<ManualPaymentRequest> {
        let request: Option<ManualPaymentRequest> = sqlx::query_as(
            r#"
            UPDATE manual_payment_requests SET
                status = 'rejected',
                rejected_at = NOW(),
                rejected_by = $2,
                rejection_reason = $3,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(request_id)
        .bind(admin_id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await?;

        let request = match request {
            Some(r) => r,
            None => {
                let existing = self.get_request(request_id).await?;
                return Err(BillingError::AlreadyProcessed(format!(
                    "manual payment {} is already {}",
                    request_id, existing.status
                )));
            }
        };

        self.events
            .log_event(
                BillingEventBuilder::new(request.user_id, BillingEventType::ManualPaymentRejected)
                    .data(serde_json::json!({
                        "request_id": request.id,
                        "reason": reason,
                    }))
                    .actor(admin_id, ActorType::Admin),
            )
            .await?;

        Ok(request)
    }

    /// Append a credit grant inside the verify transaction. Creates the
    /// account on first grant with the tier's feature snapshot; the derived
    /// balance is recomputed in the same statement.
    async fn add_credits_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        plan: PlanTier,
        credits: i64,
        request_id: Uuid,
        admin_id: Uuid,
    ) -> BillingResult<CreditAccount> {
        let features = serde_json::to_value(CreditFeatures::for_tier(plan))
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let account: CreditAccount = sqlx::query_as(
            r#"
            INSERT INTO credit_accounts (
                user_id, total_credits, used_credits, available_credits,
                plan_type, plan_start_date, is_active, features
            )
            VALUES ($1, $2, 0, $2, $3, NOW(), TRUE, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                total_credits = credit_accounts.total_credits + $2,
                available_credits = GREATEST(
                    credit_accounts.total_credits + $2 - credit_accounts.used_credits, 0),
                plan_type = $3,
                is_active = TRUE,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(credits)
        .bind(plan.to_string())
        .bind(&features)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO credit_grants (
                credit_account_id, payment_request_id, credits_added, added_by
            )
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(account.id)
        .bind(request_id)
        .bind(credits)
        .bind(admin_id)
        .execute(&mut **tx)
        .await?;

        Ok(account)
    }

    pub async fn get_account(&self, user_id: Uuid) -> BillingResult<Option<CreditAccount>> {
        let account: Option<CreditAccount> =
            sqlx::query_as("SELECT * FROM credit_accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(account)
    }

    /// Spend credits. One conditional UPDATE carries the balance guard, so
    /// concurrent spends serialize on the row and an insufficient balance
    /// leaves the account untouched.
    pub async fn use_credits(&self, user_id: Uuid, amount: i64) -> BillingResult<CreditAccount> {
        if amount <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "credit spend must be > 0, got {}",
                amount
            )));
        }

        let account: Option<CreditAccount> = sqlx::query_as(
            r#"
            UPDATE credit_accounts SET
                used_credits = used_credits + $2,
                available_credits = GREATEST(total_credits - (used_credits + $2), 0),
                updated_at = NOW()
            WHERE user_id = $1
              AND is_active = TRUE
              AND total_credits - used_credits >= $2
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await?;

        let account = match account {
            Some(a) => a,
            None => {
                let existing = self.get_account(user_id).await?;
                let available = existing
                    .map(|a| available_credits(a.total_credits, a.used_credits))
                    .unwrap_or(0);
                return Err(BillingError::InsufficientCredits {
                    requested: amount,
                    available,
                });
            }
        };

        self.events
            .log_event(
                BillingEventBuilder::new(user_id, BillingEventType::CreditsUsed).data(
                    serde_json::json!({
                        "amount": amount,
                        "available_credits": account.available_credits,
                    }),
                ),
            )
            .await?;

        Ok(account)
    }

    /// Grant history for an account, newest first
    pub async fn grant_history(
        &self,
        credit_account_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<CreditGrant>> {
        let grants: Vec<CreditGrant> = sqlx::query_as(
            r#"
            SELECT id, credit_account_id, payment_request_id, credits_added, added_by, added_at
            FROM credit_grants
            WHERE credit_account_id = $1
            ORDER BY added_at DESC
            LIMIT $2
            "#,
        )
        .bind(credit_account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(grants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_reference_number_shape() {
        let reference = generate_reference_number(datetime!(2026-01-15 12:00:00 UTC));
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "PAY");
        assert!(!parts[1].is_empty());
        assert_eq!(parts[2].len(), REFERENCE_SUFFIX_LEN);
        assert_eq!(reference, reference.to_uppercase());
        assert!(parts[2]
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    }

    #[test]
    fn test_reference_timestamp_is_base36() {
        // 36^6 = 2176782336, encodes to "1000000"
        let reference = generate_reference_number(OffsetDateTime::from_unix_timestamp(2_176_782_336).unwrap());
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts[1], "1000000");
    }

    #[test]
    fn test_references_are_distinct() {
        let now = OffsetDateTime::now_utc();
        let a = generate_reference_number(now);
        let b = generate_reference_number(now);
        assert_ne!(a, b);
    }

    #[test]
    fn test_credits_per_whole_currency_unit() {
        assert_eq!(credits_for_amount(50_000), 500);
        assert_eq!(credits_for_amount(99), 0);
        assert_eq!(credits_for_amount(150), 1);
    }

    #[test]
    fn test_available_credits_floor() {
        assert_eq!(available_credits(100, 30), 70);
        assert_eq!(available_credits(100, 100), 0);
        // Never negative, even if raw fields disagree
        assert_eq!(available_credits(100, 130), 0);
    }

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        userlab_shared::db::create_pool(&url)
            .await
            .expect("Failed to create pool")
    }

    fn new_request(user_id: Uuid) -> NewManualPayment {
        NewManualPayment {
            user_id,
            plan_type: PlanTier::Pro,
            amount_cents: 50_000,
            currency: Currency::Sar,
            payment_method: PaymentMethod::BankTransfer,
            payment_proof: None,
            bank_details: None,
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_verify_twice_is_rejected() {
        let workflow = ManualCreditWorkflow::new(test_pool().await);
        let user_id = Uuid::new_v4();
        let admin_id = Uuid::new_v4();

        let request = workflow.submit(new_request(user_id)).await.expect("submit");
        let account = workflow
            .verify(request.id, admin_id, None)
            .await
            .expect("verify");
        assert_eq!(account.total_credits, 500);

        let replay = workflow.verify(request.id, admin_id, None).await;
        assert!(matches!(replay, Err(BillingError::AlreadyProcessed(_))));

        // The first verification's grant is the only one
        let grants = workflow.grant_history(account.id, 10).await.expect("grants");
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].credits_added, 500);

        let account = workflow
            .get_account(user_id)
            .await
            .expect("get")
            .expect("account");
        assert_eq!(account.total_credits, 500);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_insufficient_spend_leaves_account_untouched() {
        let workflow = ManualCreditWorkflow::new(test_pool().await);
        let user_id = Uuid::new_v4();

        let request = workflow.submit(new_request(user_id)).await.expect("submit");
        workflow
            .verify(request.id, Uuid::new_v4(), None)
            .await
            .expect("verify");

        let overdraw = workflow.use_credits(user_id, 600).await;
        assert!(matches!(
            overdraw,
            Err(BillingError::InsufficientCredits {
                requested: 600,
                available: 500,
            })
        ));

        let account = workflow
            .get_account(user_id)
            .await
            .expect("get")
            .expect("account");
        assert_eq!(account.used_credits, 0);
        assert_eq!(account.available_credits, 500);

        // A spend within the balance still goes through afterwards
        let account = workflow.use_credits(user_id, 200).await.expect("spend");
        assert_eq!(account.used_credits, 200);
        assert_eq!(account.available_credits, 300);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_reject_stamps_rejected_by() {
        let workflow = ManualCreditWorkflow::new(test_pool().await);
        let user_id = Uuid::new_v4();
        let admin_id = Uuid::new_v4();

        let request = workflow.submit(new_request(user_id)).await.expect("submit");
        let rejected = workflow
            .reject(request.id, admin_id, "proof unreadable")
            .await
            .expect("reject");

        assert_eq!(rejected.status, "rejected");
        assert_eq!(rejected.rejected_by, Some(admin_id));
        assert_eq!(rejected.verified_by, None);
        assert!(rejected.rejected_at.is_some());

        // Rejection never creates an account
        assert!(workflow.get_account(user_id).await.expect("get").is_none());
    }
}
