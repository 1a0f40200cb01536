use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use async_trait::async_trait;
use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{check_timestamp, Checkout, GatewayClient, VerifyError};
use crate::config::WechatConfig;
use crate::error::{AppError, Result};
use crate::models::{CanonicalEvent, Gateway, GatewayEvent, Normalized, Order};

type HmacSha256 = Hmac<Sha256>;

const NATIVE_PAY_URL: &str = "https://api.mch.weixin.qq.com/v3/pay/transactions/native";
const NATIVE_PAY_PATH: &str = "/v3/pay/transactions/native";

#[derive(Debug, Deserialize)]
struct NativePayResponse {
    code_url: String,
}

/// Outer notification envelope. The interesting fields arrive encrypted
/// inside `resource`.
#[derive(Debug, Deserialize)]
struct NotifyEnvelope {
    event_type: String,
    resource: EncryptedResource,
}

#[derive(Debug, Deserialize)]
struct EncryptedResource {
    ciphertext: String,
    nonce: String,
    #[serde(default)]
    associated_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrustedPayload {
    event_type: String,
    resource: serde_json::Value,
}

#[derive(Clone)]
pub struct WechatGateway {
    client: Client,
    config: WechatConfig,
    base_url: String,
}

impl WechatGateway {
    pub fn new(config: WechatConfig, base_url: String) -> Self {
        Self {
            client: Client::new(),
            config,
            base_url,
        }
    }

    fn transport_mac(&self, message: &str) -> Result<Vec<u8>, VerifyError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.config.platform_secret.as_bytes())
            .map_err(|_| VerifyError::Malformed("platform secret"))?;
        mac.update(message.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// AES-256-GCM decryption of the notification resource, with the
    /// envelope's associated_data bound as AAD. Any tampering with the
    /// ciphertext, nonce or AAD fails authentication here.
    fn decrypt_resource(&self, resource: &EncryptedResource) -> Result<Vec<u8>, VerifyError> {
        let key_bytes = self.config.api_v3_key.as_bytes();
        if key_bytes.len() != 32 {
            return Err(VerifyError::Decryption);
        }
        let nonce_bytes = resource.nonce.as_bytes();
        if nonce_bytes.len() != 12 {
            return Err(VerifyError::Decryption);
        }

        let ciphertext = BASE64
            .decode(&resource.ciphertext)
            .map_err(|_| VerifyError::Decryption)?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
        let aad = resource.associated_data.as_deref().unwrap_or("");
        cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: &ciphertext,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| VerifyError::Decryption)
    }
}

#[async_trait]
impl GatewayClient for WechatGateway {
    fn gateway(&self) -> Gateway {
        Gateway::Wechat
    }

    async fn create_checkout(&self, order: &Order, payment_id: &str) -> Result<Checkout> {
        let body = serde_json::json!({
            "appid": self.config.app_id,
            "mchid": self.config.mch_id,
            "description": format!("Feature: {}", order.feature_id),
            "out_trade_no": payment_id,
            "notify_url": format!("{}/webhook/wechat", self.base_url),
            "amount": {
                "total": order.final_cents,
                "currency": order.currency,
            },
        })
        .to_string();

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let nonce = uuid::Uuid::new_v4().as_simple().to_string();
        let message = format!("POST\n{}\n{}\n{}\n{}\n", NATIVE_PAY_PATH, timestamp, nonce, body);
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.config.platform_secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid WeChat platform secret".to_string()))?;
        mac.update(message.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());

        let authorization = format!(
            "WECHATPAY2-HMAC-SHA256 mchid=\"{}\",timestamp=\"{}\",nonce_str=\"{}\",signature=\"{}\"",
            self.config.mch_id, timestamp, nonce, signature
        );

        let response = self
            .client
            .post(NATIVE_PAY_URL)
            .header("Authorization", authorization)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::GatewayUnavailable(format!("WeChat API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::GatewayUnavailable(format!(
                "WeChat API error: {}",
                error_text
            )));
        }

        let parsed: NativePayResponse = response.json().await.map_err(|e| {
            AppError::GatewayUnavailable(format!("Failed to parse WeChat response: {}", e))
        })?;

        // The code_url is rendered as a QR code for the buyer to scan.
        Ok(Checkout {
            session_ref: None,
            redirect_url: parsed.code_url,
        })
    }

    /// Transport signature check, then payload decryption. Both must pass
    /// before anything in the body is trusted.
    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<String, VerifyError> {
        let timestamp_str = headers
            .get("wechatpay-timestamp")
            .and_then(|v| v.to_str().ok())
            .ok_or(VerifyError::MissingHeader("wechatpay-timestamp"))?;
        let nonce = headers
            .get("wechatpay-nonce")
            .and_then(|v| v.to_str().ok())
            .ok_or(VerifyError::MissingHeader("wechatpay-nonce"))?;
        let signature = headers
            .get("wechatpay-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or(VerifyError::MissingHeader("wechatpay-signature"))?;

        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| VerifyError::Malformed("signature timestamp"))?;
        check_timestamp(timestamp, chrono::Utc::now().timestamp())?;

        let body_str =
            std::str::from_utf8(body).map_err(|_| VerifyError::Malformed("body not utf-8"))?;
        let message = format!("{}\n{}\n{}\n", timestamp_str, nonce, body_str);
        let expected = hex::encode(self.transport_mac(&message)?);

        if expected.len() != signature.len()
            || !bool::from(expected.as_bytes().ct_eq(signature.as_bytes()))
        {
            return Err(VerifyError::Mismatch);
        }

        let envelope: NotifyEnvelope =
            serde_json::from_str(body_str).map_err(|_| VerifyError::Malformed("envelope JSON"))?;
        let plaintext = self.decrypt_resource(&envelope.resource)?;
        let resource: serde_json::Value =
            serde_json::from_slice(&plaintext).map_err(|_| VerifyError::Malformed("resource JSON"))?;

        // Hand normalize a payload of trusted fields only: the envelope's
        // event_type plus the decrypted resource.
        Ok(serde_json::json!({
            "event_type": envelope.event_type,
            "resource": resource,
        })
        .to_string())
    }

    fn normalize(&self, payload: &str) -> Result<Normalized, VerifyError> {
        let trusted: TrustedPayload =
            serde_json::from_str(payload).map_err(|_| VerifyError::Malformed("payload JSON"))?;
        let resource = &trusted.resource;

        let get = |key: &str| {
            resource
                .get(key)
                .and_then(|v| v.as_str())
                .map(String::from)
        };

        if trusted.event_type == "REFUND.SUCCESS" {
            let merchant_ref =
                get("out_trade_no").ok_or(VerifyError::Malformed("missing out_trade_no"))?;
            return Ok(Normalized::Event(GatewayEvent {
                gateway: Gateway::Wechat,
                merchant_ref,
                external_txn_id: get("transaction_id").or_else(|| get("refund_id")),
                event: CanonicalEvent::PaymentRefunded,
                raw_type: trusted.event_type,
                error_code: None,
                error_message: None,
            }));
        }

        let trade_state = get("trade_state").ok_or(VerifyError::Malformed("missing trade_state"))?;
        let raw_type = format!("{}:{}", trusted.event_type, trade_state);

        let (canonical, error_code, error_message) = match trade_state.as_str() {
            "SUCCESS" => (CanonicalEvent::PaymentSucceeded, None, None),
            "PAYERROR" => (
                CanonicalEvent::PaymentFailed,
                Some(trade_state.clone()),
                get("trade_state_desc"),
            ),
            "CLOSED" | "REVOKED" => (CanonicalEvent::PaymentCancelled, None, None),
            _ => return Ok(Normalized::Ignored { raw_type }),
        };

        let merchant_ref =
            get("out_trade_no").ok_or(VerifyError::Malformed("missing out_trade_no"))?;

        Ok(Normalized::Event(GatewayEvent {
            gateway: Gateway::Wechat,
            merchant_ref,
            external_txn_id: get("transaction_id"),
            event: canonical,
            raw_type,
            error_code,
            error_message,
        }))
    }
}
