//! Payment gateway seam
//!
//! The engine never talks to a specific processor SDK. Incoming webhook
//! deliveries arrive pre-normalized as [`GatewayEvent`]s, and outgoing charge
//! attempts (retry worker) go through the [`PaymentGateway`] trait so tests
//! and self-hosted deployments can swap the transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};

/// Normalized webhook event from the payment gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    #[serde(rename = "charge.succeeded")]
    ChargeSucceeded {
        event_id: String,
        payment_intent_id: String,
        charge_id: String,
        amount_received_cents: i64,
        gateway_fee_cents: i64,
        application_fee_cents: i64,
        /// Gateway fraud signal (0-100); absent for processors that omit it
        #[serde(default)]
        risk_score: Option<i16>,
    },
    #[serde(rename = "charge.failed")]
    ChargeFailed {
        event_id: String,
        payment_intent_id: String,
        failure_code: String,
        failure_message: String,
    },
    #[serde(rename = "charge.refunded")]
    ChargeRefunded {
        event_id: String,
        payment_intent_id: String,
        refund_amount_cents: i64,
        reason: Option<String>,
    },
    #[serde(rename = "subscription.updated")]
    SubscriptionUpdated {
        event_id: String,
        subscription_id: String,
        status: String,
        #[serde(with = "time::serde::rfc3339")]
        current_period_start: OffsetDateTime,
        #[serde(with = "time::serde::rfc3339")]
        current_period_end: OffsetDateTime,
    },
}

impl GatewayEvent {
    /// Gateway-assigned event id, the dedup key for at-least-once delivery
    pub fn event_id(&self) -> &str {
        match self {
            Self::ChargeSucceeded { event_id, .. }
            | Self::ChargeFailed { event_id, .. }
            | Self::ChargeRefunded { event_id, .. }
            | Self::SubscriptionUpdated { event_id, .. } => event_id,
        }
    }
}

/// Outcome of a charge attempt against the gateway
#[derive(Debug, Clone)]
pub enum ChargeOutcome {
    Succeeded {
        charge_id: String,
        amount_received_cents: i64,
        gateway_fee_cents: i64,
        application_fee_cents: i64,
    },
    Failed {
        failure_code: String,
        failure_message: String,
    },
}

/// Outgoing charge operations. Implementations must bound every call; a
/// timeout surfaces as a `Failed` outcome so the payment falls into the
/// retry path instead of staying `pending` forever.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        payment_intent_id: &str,
        amount_cents: i64,
        currency: &str,
    ) -> BillingResult<ChargeOutcome>;
}

/// HTTP gateway client for the normalized charge API
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct ChargeRequest<'a> {
    payment_intent_id: &'a str,
    amount_cents: i64,
    currency: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    status: String,
    charge_id: Option<String>,
    amount_received_cents: Option<i64>,
    gateway_fee_cents: Option<i64>,
    application_fee_cents: Option<i64>,
    failure_code: Option<String>,
    failure_message: Option<String>,
}

impl HttpGateway {
    /// Default request timeout; charge attempts must never block a worker tick
    const TIMEOUT: Duration = Duration::from_secs(20);

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> BillingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| BillingError::Config(format!("gateway client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn charge(
        &self,
        payment_intent_id: &str,
        amount_cents: i64,
        currency: &str,
    ) -> BillingResult<ChargeOutcome> {
        let url = format!("{}/v1/charges", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChargeRequest {
                payment_intent_id,
                amount_cents,
                currency,
            })
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                // Timeouts route into the retry path rather than erroring out
                tracing::warn!(payment_intent_id, "Gateway charge timed out");
                return Ok(ChargeOutcome::Failed {
                    failure_code: "gateway_timeout".to_string(),
                    failure_message: "Charge attempt timed out".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let body: ChargeResponse = response.json().await?;
        match body.status.as_str() {
            "succeeded" => Ok(ChargeOutcome::Succeeded {
                charge_id: body
                    .charge_id
                    .ok_or_else(|| BillingError::Gateway("missing charge_id".to_string()))?,
                amount_received_cents: body.amount_received_cents.unwrap_or(amount_cents),
                gateway_fee_cents: body.gateway_fee_cents.unwrap_or(0),
                application_fee_cents: body.application_fee_cents.unwrap_or(0),
            }),
            _ => Ok(ChargeOutcome::Failed {
                failure_code: body.failure_code.unwrap_or_else(|| "unknown".to_string()),
                failure_message: body
                    .failure_message
                    .unwrap_or_else(|| "Charge declined".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_extraction() {
        let event = GatewayEvent::ChargeFailed {
            event_id: "evt_42".to_string(),
            payment_intent_id: "pi_1".to_string(),
            failure_code: "card_declined".to_string(),
            failure_message: "Card declined".to_string(),
        };
        assert_eq!(event.event_id(), "evt_42");
    }

    #[test]
    fn test_event_deserializes_from_normalized_payload() {
        let payload = serde_json::json!({
            "type": "charge.succeeded",
            "event_id": "evt_1",
            "payment_intent_id": "pi_1",
            "charge_id": "ch_1",
            "amount_received_cents": 10_000,
            "gateway_fee_cents": 320,
            "application_fee_cents": 100,
        });
        let event: GatewayEvent = serde_json::from_value(payload).unwrap();
        match event {
            GatewayEvent::ChargeSucceeded {
                amount_received_cents,
                ..
            } => assert_eq!(amount_received_cents, 10_000),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_gateway_successful_charge() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/charges")
            .match_header("authorization", "Bearer sk_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "status": "succeeded",
                    "charge_id": "ch_1",
                    "amount_received_cents": 5000,
                    "gateway_fee_cents": 175,
                    "application_fee_cents": 50
                }"#,
            )
            .create_async()
            .await;

        let gateway = HttpGateway::new(server.url(), "sk_test").unwrap();
        let outcome = gateway.charge("pi_1", 5_000, "USD").await.unwrap();
        match outcome {
            ChargeOutcome::Succeeded {
                charge_id,
                amount_received_cents,
                gateway_fee_cents,
                ..
            } => {
                assert_eq!(charge_id, "ch_1");
                assert_eq!(amount_received_cents, 5_000);
                assert_eq!(gateway_fee_cents, 175);
            }
            ChargeOutcome::Failed { failure_code, .. } => {
                panic!("charge unexpectedly failed: {}", failure_code)
            }
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_gateway_declined_charge() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/charges")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "status": "failed",
                    "failure_code": "card_declined",
                    "failure_message": "Your card was declined"
                }"#,
            )
            .create_async()
            .await;

        let gateway = HttpGateway::new(server.url(), "sk_test").unwrap();
        let outcome = gateway.charge("pi_1", 5_000, "USD").await.unwrap();
        match outcome {
            ChargeOutcome::Failed { failure_code, .. } => {
                assert_eq!(failure_code, "card_declined")
            }
            ChargeOutcome::Succeeded { .. } => panic!("charge unexpectedly succeeded"),
        }
    }
}
