use async_trait::async_trait;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{check_timestamp, Checkout, GatewayClient, VerifyError};
use crate::config::StripeConfig;
use crate::error::{AppError, Result};
use crate::models::{CanonicalEvent, Gateway, GatewayEvent, Normalized, Order};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: Client,
    config: StripeConfig,
    base_url: String,
}

impl StripeGateway {
    pub fn new(config: StripeConfig, base_url: String) -> Self {
        Self {
            client: Client::new(),
            config,
            base_url,
        }
    }
}

/// Pull our merchant reference out of a Stripe object. The payment id is
/// stamped into metadata at session creation (and propagated onto the
/// payment intent via payment_intent_data), so every event we act on
/// carries it.
fn merchant_ref_of(object: &serde_json::Value) -> Option<String> {
    object
        .get("metadata")
        .and_then(|m| m.get("payment_id"))
        .and_then(|v| v.as_str())
        .map(String::from)
        .or_else(|| {
            object
                .get("client_reference_id")
                .and_then(|v| v.as_str())
                .map(String::from)
        })
}

#[async_trait]
impl GatewayClient for StripeGateway {
    fn gateway(&self) -> Gateway {
        Gateway::Stripe
    }

    async fn create_checkout(&self, order: &Order, payment_id: &str) -> Result<Checkout> {
        let amount = order.final_cents.to_string();
        let product_name = format!("Feature: {}", order.feature_id);
        let success_url = format!("{}/return/success?order={}", self.base_url, order.id);
        let cancel_url = format!("{}/return/cancel?order={}", self.base_url, order.id);

        let response = self
            .client
            .post("https://api.stripe.com/v1/checkout/sessions")
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(&[
                ("mode", "payment"),
                ("success_url", success_url.as_str()),
                ("cancel_url", cancel_url.as_str()),
                ("client_reference_id", payment_id),
                ("line_items[0][price_data][currency]", &order.currency),
                ("line_items[0][price_data][unit_amount]", amount.as_str()),
                (
                    "line_items[0][price_data][product_data][name]",
                    product_name.as_str(),
                ),
                ("line_items[0][quantity]", "1"),
                ("metadata[payment_id]", payment_id),
                ("payment_intent_data[metadata][payment_id]", payment_id),
            ])
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::GatewayUnavailable(format!(
                "Stripe API error: {}",
                error_text
            )));
        }

        let session: CreateCheckoutSessionResponse = response.json().await.map_err(|e| {
            AppError::GatewayUnavailable(format!("Failed to parse Stripe response: {}", e))
        })?;

        Ok(Checkout {
            session_ref: Some(session.id),
            redirect_url: session.url,
        })
    }

    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<String, VerifyError> {
        // Stripe signature format: t=timestamp,v1=signature
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or(VerifyError::MissingHeader("stripe-signature"))?;

        let mut timestamp = None;
        let mut sig_v1 = None;
        for part in signature.split(',') {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str = timestamp.ok_or(VerifyError::Malformed("signature header"))?;
        let sig_v1 = sig_v1.ok_or(VerifyError::Malformed("signature header"))?;

        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| VerifyError::Malformed("signature timestamp"))?;
        check_timestamp(timestamp, chrono::Utc::now().timestamp())?;

        let body_str =
            std::str::from_utf8(body).map_err(|_| VerifyError::Malformed("body not utf-8"))?;
        let signed_payload = format!("{}.{}", timestamp_str, body_str);

        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.as_bytes())
            .map_err(|_| VerifyError::Malformed("webhook secret"))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison. Length itself is not secret (always 64
        // hex chars for SHA-256).
        if expected.len() != sig_v1.len()
            || !bool::from(expected.as_bytes().ct_eq(sig_v1.as_bytes()))
        {
            return Err(VerifyError::Mismatch);
        }

        Ok(body_str.to_string())
    }

    fn normalize(&self, payload: &str) -> Result<Normalized, VerifyError> {
        let event: StripeEvent =
            serde_json::from_str(payload).map_err(|_| VerifyError::Malformed("event JSON"))?;
        let object = &event.data.object;
        let raw_type = event.event_type.clone();

        let (canonical, error_code, error_message) = match raw_type.as_str() {
            "payment_intent.succeeded" => (CanonicalEvent::PaymentSucceeded, None, None),
            "payment_intent.payment_failed" => {
                let err = object.get("last_payment_error");
                (
                    CanonicalEvent::PaymentFailed,
                    err.and_then(|e| e.get("code"))
                        .and_then(|v| v.as_str())
                        .map(String::from),
                    err.and_then(|e| e.get("message"))
                        .and_then(|v| v.as_str())
                        .map(String::from),
                )
            }
            "payment_intent.canceled" | "checkout.session.expired" => {
                (CanonicalEvent::PaymentCancelled, None, None)
            }
            "charge.refunded" => (CanonicalEvent::PaymentRefunded, None, None),
            _ => return Ok(Normalized::Ignored { raw_type }),
        };

        let merchant_ref =
            merchant_ref_of(object).ok_or(VerifyError::Malformed("missing merchant reference"))?;
        let external_txn_id = object
            .get("id")
            .and_then(|v| v.as_str())
            .map(String::from);

        Ok(Normalized::Event(GatewayEvent {
            gateway: Gateway::Stripe,
            merchant_ref,
            external_txn_id,
            event: canonical,
            raw_type,
            error_code,
            error_message,
        }))
    }
}
