//! Payment gateway webhook endpoint
//!
//! Deliveries arrive signed with HMAC-SHA256 over the raw body. The signature
//! is checked before the body is parsed; replayed events are absorbed inside
//! the facade's dedup and still return 200 so the gateway stops redelivering.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    body::Bytes,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use userlab_billing::GatewayEvent;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const SIGNATURE_HEADER: &str = "x-gateway-signature";

type HmacSha256 = Hmac<Sha256>;

/// Verify the HMAC-SHA256 hex signature over the raw request body
fn verify_signature(secret: &str, body: &[u8], provided_hex: &str) -> bool {
    #[allow(clippy::expect_used)] // HMAC accepts keys of any size; this cannot fail
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);

    let provided = match hex::decode(provided_hex.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    // Mac::verify_slice is constant-time
    mac.verify_slice(&provided).is_ok()
}

/// POST /webhooks/gateway
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiError::InvalidSignature)?;

    if !verify_signature(&state.config.gateway_webhook_secret, &body, signature) {
        tracing::warn!("Webhook delivery with invalid signature rejected");
        return Err(ApiError::InvalidSignature);
    }

    let event: GatewayEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("malformed event payload: {}", e)))?;

    let event_id = event.event_id().to_string();
    state.billing.handle_gateway_event(event).await?;

    tracing::info!(event_id = %event_id, "Gateway event processed");
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-webhook-secret-at-least-32-chars!!";

    fn sign(body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"type":"charge.failed"}"#;
        let signature = sign(body);
        assert!(verify_signature(SECRET, body, &signature));
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign(br#"{"type":"charge.failed"}"#);
        assert!(!verify_signature(
            SECRET,
            br#"{"type":"charge.succeeded"}"#,
            &signature
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = br#"{"type":"charge.failed"}"#;
        let signature = sign(body);
        assert!(!verify_signature("another-secret-also-32-characters!!", body, &signature));
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        assert!(!verify_signature(SECRET, b"{}", "not-hex"));
    }
}
