//! Payment retry drain
//!
//! Re-charges failed payments whose backoff has elapsed. Each payment is
//! claimed with its observed attempt count before the gateway is called, so a
//! second worker instance draining the same tick skips it instead of charging
//! the card twice.

use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use userlab_billing::{BillingError, BillingFacade, ChargeOutcome, PaymentGateway};

const RETRY_BATCH_SIZE: i64 = 20;

/// One drain pass over the retry queue
pub async fn drain_retry_queue(pool: &PgPool, gateway: &dyn PaymentGateway) {
    let facade = BillingFacade::new(pool.clone());
    let now = OffsetDateTime::now_utc();

    let due = match facade.retries().retryable_payments(now, RETRY_BATCH_SIZE).await {
        Ok(payments) => payments,
        Err(e) => {
            error!(error = %e, "Failed to fetch retryable payments");
            return;
        }
    };

    if due.is_empty() {
        return;
    }

    info!(count = due.len(), "Draining payment retry queue");

    for payment in due {
        let intent_id = match payment.gateway_intent_id.clone() {
            Some(id) => id,
            None => {
                warn!(payment_id = %payment.id, "Retryable payment has no gateway intent, skipping");
                continue;
            }
        };

        // Claim the attempt; losing the claim means another worker has it
        let claimed = match facade
            .retries()
            .claim_for_retry(payment.id, payment.retry_attempts)
            .await
        {
            Ok(p) => p,
            Err(BillingError::ConcurrentModification(_)) => continue,
            Err(e) => {
                error!(payment_id = %payment.id, error = %e, "Failed to claim payment for retry");
                continue;
            }
        };

        let outcome = match gateway
            .charge(&intent_id, claimed.amount_cents, &claimed.currency)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                // Transport errors count as a failed attempt
                warn!(payment_id = %claimed.id, error = %e, "Gateway charge errored");
                ChargeOutcome::Failed {
                    failure_code: "gateway_error".to_string(),
                    failure_message: e.to_string(),
                }
            }
        };

        let result = match outcome {
            ChargeOutcome::Succeeded {
                charge_id,
                amount_received_cents,
                gateway_fee_cents,
                application_fee_cents,
            } => {
                facade
                    .record_success(
                        &intent_id,
                        &charge_id,
                        amount_received_cents,
                        gateway_fee_cents,
                        application_fee_cents,
                        None,
                    )
                    .await
            }
            ChargeOutcome::Failed {
                failure_code,
                failure_message,
            } => {
                facade
                    .record_failure(&intent_id, &failure_code, &failure_message)
                    .await
            }
        };

        if let Err(e) = result {
            error!(payment_id = %claimed.id, error = %e, "Failed to record retry outcome");
        }
    }
}
